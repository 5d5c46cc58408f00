//! Session (C3): owns the bytes-on-wire for one logical counterparty
//! connection — transport lifecycle, sequence-number discipline, and the
//! Logon/Heartbeat/TestRequest/Logout state machine.
//!
//! Writes are serialized by a single writer lock (`writer`); the reader
//! side (`reader`) tracks the next expected inbound sequence number, the
//! gap-fill queue, and the test-request-pending flag. The two locks are
//! independent so an outbound heartbeat never blocks on inbound parsing.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::codec::{self, Header, ParseError};
use crate::core::clock::{Clock, SystemClock};
use crate::core::errors::{EngineError, EngineResult};
use crate::core::types::MsgType;
use crate::message::Envelope;
use crate::pool::MessagePool;
use crate::resilience::{BackoffConfig, ExponentialBackoff, GapDetector};

/// Composite key: sender-comp-id + target-comp-id, per the FIX convention
/// that a logical session is scoped to one pair of counterparty ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId {
    pub sender_comp_id: String,
    pub target_comp_id: String,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.sender_comp_id, self.target_comp_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    LoggedOn,
    LoggingOut,
    Faulted,
}

/// Handed up to Order Manager / Market-Data Manager / Routing Engine.
pub enum SessionEvent {
    LoggedOn,
    LoggedOut,
    Application(Envelope),
}

/// TLS peer verification settings. There is deliberately no "skip
/// verification" option: production use requires full CA-chain and
/// hostname verification, never a permissive any-cert validator.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub server_name: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub target_addr: String,
    pub heartbeat_interval: Duration,
    /// How long a sequence gap may sit unfilled before the session gives up
    /// on the counterparty's resend and faults. Independent of the
    /// heartbeat/TestRequest liveness check: a venue can keep sending
    /// well-formed heartbeats while still never filling a gap.
    pub resend_window: Duration,
    pub reset_seq_num_on_logon: bool,
    pub reconnect: Option<BackoffConfig>,
    pub tls: Option<TlsConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_addr: String::new(),
            heartbeat_interval: Duration::from_secs(30),
            resend_window: Duration::from_secs(60),
            reset_seq_num_on_logon: false,
            reconnect: None,
            tls: None,
        }
    }
}

/// Abstraction over the byte stream so the session doesn't care whether
/// it's plaintext TCP or TLS. Blocking, matching the one-reader-thread
/// model: a session's reader loop calls `recv` in a loop on its own
/// OS thread.
pub trait Transport: Send {
    fn send(&mut self, buf: &[u8]) -> io::Result<()>;
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn shutdown(&mut self);
}

pub struct PlainTcpTransport {
    stream: TcpStream,
}

impl PlainTcpTransport {
    pub fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl Transport for PlainTcpTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn shutdown(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

pub struct TlsTransport {
    conn: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
}

impl TlsTransport {
    pub fn connect(addr: &str, config: &TlsConfig) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;

        let mut root_store = rustls::RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        for cert in native {
            let _ = root_store.add(cert);
        }

        let client_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let server_name = rustls::pki_types::ServerName::try_from(config.server_name.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let client = rustls::ClientConnection::new(Arc::new(client_config), server_name)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        Ok(Self {
            conn: rustls::StreamOwned::new(client, stream),
        })
    }
}

impl Transport for TlsTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<()> {
        self.conn.write_all(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.conn.read(buf)
    }

    fn shutdown(&mut self) {
        let _ = self.conn.sock.shutdown(std::net::Shutdown::Both);
    }
}

struct WriterState {
    transport: Option<Box<dyn Transport>>,
    out_seq: u32,
    last_outbound_nanos: u64,
}

struct ReaderState {
    in_seq: u32,
    last_inbound_nanos: u64,
    gap: GapDetector,
    pending: Vec<Envelope>,
    awaiting_resend: bool,
    /// Hardware timestamp at which `awaiting_resend` last flipped to
    /// `true`. Only meaningful while `awaiting_resend` is set.
    gap_opened_at_nanos: u64,
    test_request_pending: bool,
}

pub struct Session {
    id: SessionId,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    pool: Arc<MessagePool>,
    phase: Mutex<SessionPhase>,
    writer: Mutex<WriterState>,
    reader: Mutex<ReaderState>,
}

impl Session {
    pub fn new(id: SessionId, config: SessionConfig, pool: Arc<MessagePool>) -> Self {
        Self::with_clock(id, config, pool, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        id: SessionId,
        config: SessionConfig,
        pool: Arc<MessagePool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id,
            config,
            clock,
            pool,
            phase: Mutex::new(SessionPhase::Disconnected),
            writer: Mutex::new(WriterState {
                transport: None,
                out_seq: 0,
                last_outbound_nanos: 0,
            }),
            reader: Mutex::new(ReaderState {
                in_seq: 0,
                last_inbound_nanos: 0,
                gap: GapDetector::new(),
                pending: Vec::new(),
                awaiting_resend: false,
                gap_opened_at_nanos: 0,
                test_request_pending: false,
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    /// Open the transport and send Logon. Per the state table, the move to
    /// `LoggedOn` happens only once the counterparty's Logon is received
    /// and dispatched, not here.
    pub fn connect(&self) -> EngineResult<()> {
        *self.phase.lock() = SessionPhase::Connecting;

        let transport: Box<dyn Transport> = match &self.config.tls {
            Some(tls_cfg) => Box::new(
                TlsTransport::connect(&self.config.target_addr, tls_cfg)
                    .map_err(|e| EngineError::transport(self.id.to_string(), e.to_string()))?,
            ),
            None => Box::new(
                PlainTcpTransport::connect(&self.config.target_addr)
                    .map_err(|e| EngineError::transport(self.id.to_string(), e.to_string()))?,
            ),
        };

        {
            let mut writer = self.writer.lock();
            writer.transport = Some(transport);
            if self.config.reset_seq_num_on_logon {
                writer.out_seq = 0;
            }
        }
        if self.config.reset_seq_num_on_logon {
            let mut reader = self.reader.lock();
            reader.in_seq = 0;
            reader.gap.reset_at_sequence(0);
        }

        let mut fields = vec![
            (98u16, "0".to_string()), // EncryptMethod: none (TLS, if any, is below FIX)
            (108, self.config.heartbeat_interval.as_secs().to_string()),
        ];
        if self.config.reset_seq_num_on_logon {
            fields.push((141, "Y".to_string()));
        }
        self.send_raw(MsgType::Logon, fields)?;
        Ok(())
    }

    /// Reconnect using the configured capped exponential back-off; if no
    /// reconnect policy is set, this is equivalent to one `connect()` call.
    pub fn connect_with_retry(&self) -> EngineResult<()> {
        let Some(cfg) = self.config.reconnect.clone() else {
            return self.connect();
        };
        let mut backoff = ExponentialBackoff::with_config(cfg);
        loop {
            match self.connect() {
                Ok(()) => return Ok(()),
                Err(err) => match backoff.next_delay() {
                    Some(delay) => std::thread::sleep(delay),
                    None => return Err(err),
                },
            }
        }
    }

    pub fn disconnect(&self) -> EngineResult<()> {
        *self.phase.lock() = SessionPhase::LoggingOut;
        self.send_raw(MsgType::Logout, vec![]).map(|_| ())
    }

    /// Send an application message (tag 35 not one of the administrative
    /// types) and return the assigned outgoing sequence number.
    pub fn send_application(&self, msg_type: MsgType, fields: Vec<(u16, String)>) -> EngineResult<u32> {
        if self.phase() != SessionPhase::LoggedOn {
            return Err(EngineError::transport(self.id.to_string(), "session not logged on"));
        }
        self.send_raw(msg_type, fields)
    }

    /// Read more bytes from the transport into `buf`. Shares the writer
    /// lock with outbound sends, since both directions of a `Transport`
    /// are the same boxed trait object; a blocking `recv` stalls an
    /// outbound heartbeat until it returns, same as on a raw socket.
    pub fn recv_raw(&self, buf: &mut [u8]) -> EngineResult<usize> {
        let mut writer = self.writer.lock();
        let transport = writer
            .transport
            .as_mut()
            .ok_or_else(|| EngineError::transport(self.id.to_string(), "no transport attached"))?;
        transport
            .recv(buf)
            .map_err(|e| EngineError::transport(self.id.to_string(), e.to_string()))
    }

    /// Feed freshly-read bytes in; returns the events produced and the
    /// number of bytes consumed (the caller should drop consumed bytes
    /// from its read buffer and retain the remainder).
    pub fn on_bytes_received(&self, buf: &[u8]) -> EngineResult<(Vec<SessionEvent>, usize)> {
        let mut events = Vec::new();
        let mut consumed = 0usize;

        loop {
            match codec::parse(&buf[consumed..], &self.pool, self.clock.hardware_now_nanos()) {
                Ok((env, n)) => {
                    consumed += n;
                    if let Err(e) = codec::validate(&env) {
                        self.pool.release(env);
                        self.fault(e.clone());
                        return Err(e);
                    }
                    events.extend(self.ingest(env)?);
                }
                Err(ParseError::NeedMore) => break,
                Err(e) => {
                    let err = EngineError::protocol(format!("framing error: {e:?}"));
                    self.fault(err.clone());
                    return Err(err);
                }
            }
        }

        Ok((events, consumed))
    }

    /// Checked from the reader task's wake-ups: send a heartbeat if the
    /// interval elapsed since the last send, and escalate to TestRequest
    /// (then Faulted) if nothing has been heard from the peer in two
    /// intervals.
    pub fn check_timers(&self) -> EngineResult<()> {
        if self.phase() != SessionPhase::LoggedOn {
            return Ok(());
        }
        let now = self.clock.hardware_now_nanos();
        let interval_nanos = self.config.heartbeat_interval.as_nanos() as u64;

        let since_outbound = {
            let writer = self.writer.lock();
            now.saturating_sub(writer.last_outbound_nanos)
        };
        if since_outbound >= interval_nanos {
            self.send_raw(MsgType::Heartbeat, vec![])?;
        }

        let (since_inbound, test_pending, awaiting_resend, gap_opened_at_nanos) = {
            let reader = self.reader.lock();
            (
                now.saturating_sub(reader.last_inbound_nanos),
                reader.test_request_pending,
                reader.awaiting_resend,
                reader.gap_opened_at_nanos,
            )
        };

        if awaiting_resend {
            let resend_window_nanos = self.config.resend_window.as_nanos() as u64;
            if now.saturating_sub(gap_opened_at_nanos) >= resend_window_nanos {
                let err = EngineError::protocol("resend window expired before gap was filled");
                self.fault(err.clone());
                return Err(err);
            }
        }

        if since_inbound >= 2 * interval_nanos {
            if test_pending {
                let err = EngineError::protocol("no response to TestRequest within heartbeat interval");
                self.fault(err.clone());
                return Err(err);
            }
            self.reader.lock().test_request_pending = true;
            self.send_raw(MsgType::TestRequest, vec![(112, format!("TEST{now}"))])?;
        }
        Ok(())
    }

    fn send_raw(&self, msg_type: MsgType, fields: Vec<(u16, String)>) -> EngineResult<u32> {
        let result = self.send_raw_inner(&msg_type, fields);
        if let Err(ref err) = result {
            self.fault(err.clone());
        }
        result
    }

    fn send_raw_inner(&self, msg_type: &MsgType, fields: Vec<(u16, String)>) -> EngineResult<u32> {
        let mut writer = self.writer.lock();
        let seq = writer.out_seq + 1;
        let header = Header {
            sender_comp_id: self.id.sender_comp_id.clone(),
            target_comp_id: self.id.target_comp_id.clone(),
            msg_seq_num: seq,
            sending_time_micros: self.clock.wall_now_micros(),
        };

        let mut buf = Vec::with_capacity(256);
        codec::build(msg_type, &header, &fields, &mut buf)
            .map_err(|e| EngineError::protocol(format!("build failed: {e:?}")))?;

        let transport = writer
            .transport
            .as_mut()
            .ok_or_else(|| EngineError::transport(self.id.to_string(), "no transport attached"))?;
        transport
            .send(&buf)
            .map_err(|e| EngineError::transport(self.id.to_string(), e.to_string()))?;

        writer.out_seq = seq;
        writer.last_outbound_nanos = self.clock.hardware_now_nanos();
        Ok(seq)
    }

    /// Incoming-sequence discipline: accept in order, queue ahead of a gap
    /// and request a resend, fault on an unexplained sequence regression.
    fn ingest(&self, env: Envelope) -> EngineResult<Vec<SessionEvent>> {
        let seq = env.seq_num;
        let poss_dup = env.field(43) == Some("Y");
        let expected = self.reader.lock().in_seq + 1;

        if seq < expected {
            if poss_dup {
                return Ok(self.dispatch(env));
            }
            let err = EngineError::protocol(format!(
                "sequence {seq} below expected {expected} without PossDupFlag"
            ));
            self.pool.release(env);
            self.fault(err.clone());
            return Err(err);
        }

        {
            let mut reader = self.reader.lock();
            reader.last_inbound_nanos = self.clock.hardware_now_nanos();
            reader.test_request_pending = false;
        }

        if seq == expected {
            {
                let mut reader = self.reader.lock();
                reader.in_seq = seq;
                reader.gap.check(seq);
            }
            let mut events = self.dispatch(env);

            loop {
                let next = {
                    let reader = self.reader.lock();
                    reader.in_seq + 1
                };
                let queued = {
                    let mut reader = self.reader.lock();
                    reader.pending.iter().position(|e| e.seq_num == next).map(|p| reader.pending.remove(p))
                };
                match queued {
                    Some(queued_env) => {
                        self.reader.lock().in_seq = next;
                        events.extend(self.dispatch(queued_env));
                    }
                    None => break,
                }
            }
            let mut reader = self.reader.lock();
            let still_waiting = !reader.pending.is_empty();
            if still_waiting && !reader.awaiting_resend {
                reader.gap_opened_at_nanos = self.clock.hardware_now_nanos();
            } else if !still_waiting {
                reader.gap_opened_at_nanos = 0;
            }
            reader.awaiting_resend = still_waiting;
            return Ok(events);
        }

        // seq > expected: gap. Queue and request a resend, but only once
        // per gap (subsequent arrivals while waiting just extend the queue).
        let gap_size;
        let already_waiting;
        {
            let mut reader = self.reader.lock();
            gap_size = reader.gap.check(seq);
            already_waiting = reader.awaiting_resend;
            reader.pending.push(env);
            reader.awaiting_resend = true;
            if !already_waiting {
                reader.gap_opened_at_nanos = self.clock.hardware_now_nanos();
            }
        }
        tracing::warn!(session = %self.id, expected, received = seq, gap = gap_size, "sequence gap detected");
        if !already_waiting {
            self.send_raw(MsgType::ResendRequest, vec![(7u16, expected.to_string()), (16, (seq - 1).to_string())])?;
        }
        Ok(Vec::new())
    }

    fn dispatch(&self, env: Envelope) -> Vec<SessionEvent> {
        match &env.msg_type {
            MsgType::Logon => {
                *self.phase.lock() = SessionPhase::LoggedOn;
                self.pool.release(env);
                vec![SessionEvent::LoggedOn]
            }
            MsgType::Heartbeat => {
                self.pool.release(env);
                Vec::new()
            }
            MsgType::TestRequest => {
                let test_req_id = env.field(112).map(str::to_string);
                self.pool.release(env);
                let fields = test_req_id.map(|id| vec![(112u16, id)]).unwrap_or_default();
                let _ = self.send_raw(MsgType::Heartbeat, fields);
                Vec::new()
            }
            MsgType::ResendRequest => {
                // Filling a resend request requires a persisted outbound
                // message store, which this engine does not keep; the
                // counterparty is expected to fall back to SequenceReset
                // (GapFillFlag) when no resend arrives. Nothing to do here
                // beyond returning the envelope.
                self.pool.release(env);
                Vec::new()
            }
            MsgType::Logout => {
                self.pool.release(env);
                *self.phase.lock() = SessionPhase::LoggingOut;
                let _ = self.send_raw(MsgType::Logout, vec![]);
                self.close_transport();
                *self.phase.lock() = SessionPhase::Disconnected;
                vec![SessionEvent::LoggedOut]
            }
            MsgType::SequenceReset => {
                let new_seq = env.field(36).and_then(|s| s.parse::<u32>().ok());
                self.pool.release(env);
                if let Some(new_seq) = new_seq {
                    self.reader.lock().in_seq = new_seq.saturating_sub(1);
                }
                Vec::new()
            }
            _ => vec![SessionEvent::Application(env)],
        }
    }

    fn close_transport(&self) {
        let mut writer = self.writer.lock();
        if let Some(mut transport) = writer.transport.take() {
            transport.shutdown();
        }
    }

    fn fault(&self, err: EngineError) {
        tracing::error!(session = %self.id, error = %err, "session faulted");
        *self.phase.lock() = SessionPhase::Faulted;
        self.close_transport();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

    /// Clock with an externally-advanceable hardware timestamp, for
    /// deterministically exercising `check_timers()` without real sleeps.
    struct ManualClock {
        hardware_nanos: AtomicU64,
        wall_micros: AtomicI64,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                hardware_nanos: AtomicU64::new(0),
                wall_micros: AtomicI64::new(1_700_000_000_000_000),
            }
        }

        fn advance(&self, delta: Duration) {
            self.hardware_nanos.fetch_add(delta.as_nanos() as u64, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn hardware_now_nanos(&self) -> u64 {
            self.hardware_nanos.load(Ordering::SeqCst)
        }

        fn wall_now_micros(&self) -> i64 {
            self.wall_micros.load(Ordering::SeqCst)
        }
    }

    struct LoopbackTransport {
        outbound: Arc<Mutex<Vec<u8>>>,
        inbound: Arc<Mutex<VecDeque<u8>>>,
    }

    impl Transport for LoopbackTransport {
        fn send(&mut self, buf: &[u8]) -> io::Result<()> {
            self.outbound.lock().extend_from_slice(buf);
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut inbound = self.inbound.lock();
            let n = inbound.len().min(buf.len());
            for slot in buf.iter_mut().take(n) {
                *slot = inbound.pop_front().unwrap();
            }
            Ok(n)
        }

        fn shutdown(&mut self) {}
    }

    fn test_session() -> (Session, Arc<Mutex<Vec<u8>>>) {
        let pool = Arc::new(MessagePool::new(16, 1024));
        let id = SessionId {
            sender_comp_id: "BUYSIDE".to_string(),
            target_comp_id: "VENUE".to_string(),
        };
        let session = Session::new(id, SessionConfig::default(), pool);
        let outbound = Arc::new(Mutex::new(Vec::new()));
        let transport = LoopbackTransport {
            outbound: outbound.clone(),
            inbound: Arc::new(Mutex::new(VecDeque::new())),
        };
        session.writer.lock().transport = Some(Box::new(transport));
        (session, outbound)
    }

    fn build_message(msg_type: MsgType, sender: &str, target: &str, seq: u32, fields: &[(u16, String)]) -> Vec<u8> {
        let header = Header {
            sender_comp_id: sender.to_string(),
            target_comp_id: target.to_string(),
            msg_seq_num: seq,
            sending_time_micros: 1_700_000_000_000_000,
        };
        let mut out = Vec::new();
        codec::build(&msg_type, &header, fields, &mut out).unwrap();
        out
    }

    #[test]
    fn send_application_requires_logged_on() {
        let (session, _out) = test_session();
        let result = session.send_application(MsgType::NewOrderSingle, vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn send_application_assigns_increasing_sequence_numbers() {
        let (session, _out) = test_session();
        *session.phase.lock() = SessionPhase::LoggedOn;
        let s1 = session.send_application(MsgType::NewOrderSingle, vec![(11, "A".into())]).unwrap();
        let s2 = session.send_application(MsgType::NewOrderSingle, vec![(11, "B".into())]).unwrap();
        assert_eq!(s1, 1);
        assert_eq!(s2, 2);
    }

    #[test]
    fn in_order_message_is_delivered_immediately() {
        let (session, _out) = test_session();
        *session.phase.lock() = SessionPhase::LoggedOn;
        let bytes = build_message(MsgType::ExecutionReport, "VENUE", "BUYSIDE", 1, &[(37, "1".into())]);
        let (events, consumed) = session.on_bytes_received(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SessionEvent::Application(_)));
        assert_eq!(session.reader.lock().in_seq, 1);
    }

    #[test]
    fn gap_is_queued_and_resend_requested() {
        let (session, outbound) = test_session();
        *session.phase.lock() = SessionPhase::LoggedOn;
        let bytes = build_message(MsgType::ExecutionReport, "VENUE", "BUYSIDE", 3, &[(37, "1".into())]);
        let (events, _) = session.on_bytes_received(&bytes).unwrap();
        assert!(events.is_empty());
        assert!(session.reader.lock().awaiting_resend);
        assert_eq!(session.reader.lock().pending.len(), 1);
        assert!(!outbound.lock().is_empty()); // ResendRequest went out
    }

    #[test]
    fn gap_fill_drains_queue_once_missing_messages_arrive() {
        let (session, _out) = test_session();
        *session.phase.lock() = SessionPhase::LoggedOn;
        let msg2 = build_message(MsgType::ExecutionReport, "VENUE", "BUYSIDE", 2, &[(37, "2".into())]);
        let msg3 = build_message(MsgType::ExecutionReport, "VENUE", "BUYSIDE", 3, &[(37, "3".into())]);

        let (events, _) = session.on_bytes_received(&msg3).unwrap();
        assert!(events.is_empty());

        let (events, _) = session.on_bytes_received(&msg2).unwrap();
        assert_eq!(events.len(), 2); // msg2 then queued msg3
        assert_eq!(session.reader.lock().in_seq, 3);
        assert!(!session.reader.lock().awaiting_resend);
    }

    #[test]
    fn expired_resend_window_faults_session_even_with_fresh_heartbeats() {
        let clock = Arc::new(ManualClock::new());
        let pool = Arc::new(MessagePool::new(16, 1024));
        let id = SessionId {
            sender_comp_id: "BUYSIDE".to_string(),
            target_comp_id: "VENUE".to_string(),
        };
        let mut config = SessionConfig::default();
        config.heartbeat_interval = Duration::from_secs(30);
        config.resend_window = Duration::from_secs(10);
        let session = Session::with_clock(id, config, pool, clock.clone());
        let outbound = Arc::new(Mutex::new(Vec::new()));
        let transport = LoopbackTransport {
            outbound: outbound.clone(),
            inbound: Arc::new(Mutex::new(VecDeque::new())),
        };
        session.writer.lock().transport = Some(Box::new(transport));
        *session.phase.lock() = SessionPhase::LoggedOn;

        let bytes = build_message(MsgType::ExecutionReport, "VENUE", "BUYSIDE", 3, &[(37, "1".into())]);
        let (events, _) = session.on_bytes_received(&bytes).unwrap();
        assert!(events.is_empty());
        assert!(session.reader.lock().awaiting_resend);

        // Advance past the resend window but well inside the heartbeat
        // interval, so the TestRequest escalation path would not fire.
        clock.advance(Duration::from_secs(11));
        let result = session.check_timers();
        assert!(result.is_err());
        assert_eq!(session.phase(), SessionPhase::Faulted);
    }

    #[test]
    fn sequence_regression_without_poss_dup_faults_session() {
        let (session, _out) = test_session();
        *session.phase.lock() = SessionPhase::LoggedOn;
        session.reader.lock().in_seq = 5;
        let bytes = build_message(MsgType::ExecutionReport, "VENUE", "BUYSIDE", 3, &[(37, "1".into())]);
        let result = session.on_bytes_received(&bytes);
        assert!(result.is_err());
        assert_eq!(session.phase(), SessionPhase::Faulted);
    }

    #[test]
    fn logon_reply_transitions_to_logged_on() {
        let (session, _out) = test_session();
        *session.phase.lock() = SessionPhase::Connecting;
        let bytes = build_message(MsgType::Logon, "VENUE", "BUYSIDE", 1, &[(98, "0".into()), (108, "30".into())]);
        let (events, _) = session.on_bytes_received(&bytes).unwrap();
        assert!(matches!(events[0], SessionEvent::LoggedOn));
        assert_eq!(session.phase(), SessionPhase::LoggedOn);
    }
}
