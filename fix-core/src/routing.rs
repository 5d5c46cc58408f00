//! Routing Engine (C5): composes sessions and order managers behind a
//! single facade, selects a venue per outbound order, and fans inbound
//! executions and market data out to upstream callbacks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::core::clock::Clock;
use crate::core::errors::{EngineError, EngineResult};
use crate::core::types::MsgType;
use crate::order::{NewOrderRequest, OrderEvent, OrderManager};
use crate::session::{Session, SessionId, SessionPhase};

const ERROR_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_ERROR_THRESHOLD: usize = 10;
const DEFAULT_COOLDOWN_HEARTBEATS: u32 = 3;

/// Chooses a venue among the sessions currently eligible for a symbol.
/// The only contract: return one of the given candidates, or `None` if
/// nothing is eligible. Price/liquidity-aware selection is explicitly out
/// of scope; only a trivial default is specified.
pub trait VenueSelector: Send + Sync {
    fn select(&self, symbol: &str, candidates: &[SessionId]) -> Option<SessionId>;
}

/// Round-robin across whatever healthy sessions are currently eligible for
/// the symbol, independent of the symbol itself (a refinement that weighs
/// symbol-specific venue coverage is future work, not specified here).
#[derive(Default)]
pub struct RoundRobinSelector {
    cursor: AtomicUsize,
}

impl VenueSelector for RoundRobinSelector {
    fn select(&self, _symbol: &str, candidates: &[SessionId]) -> Option<SessionId> {
        if candidates.is_empty() {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[i].clone())
    }
}

struct Venue {
    session: Arc<Session>,
    order_manager: Arc<OrderManager>,
    error_timestamps: Mutex<VecDeque<u64>>,
    cooldown_remaining: AtomicU32,
}

impl Venue {
    fn record_error(&self, now_nanos: u64) {
        let mut errors = self.error_timestamps.lock();
        errors.push_back(now_nanos);
        self.trim(&mut errors, now_nanos);
        self.cooldown_remaining.store(DEFAULT_COOLDOWN_HEARTBEATS, Ordering::Relaxed);
    }

    fn trim(&self, errors: &mut VecDeque<u64>, now_nanos: u64) {
        let window_nanos = ERROR_WINDOW.as_nanos() as u64;
        while let Some(&oldest) = errors.front() {
            if now_nanos.saturating_sub(oldest) > window_nanos {
                errors.pop_front();
            } else {
                break;
            }
        }
    }

    fn error_count(&self, now_nanos: u64) -> usize {
        let mut errors = self.error_timestamps.lock();
        self.trim(&mut errors, now_nanos);
        errors.len()
    }

    fn record_heartbeat_success(&self) {
        let current = self.cooldown_remaining.load(Ordering::Relaxed);
        if current > 0 {
            self.cooldown_remaining.store(current - 1, Ordering::Relaxed);
        }
    }

    fn is_healthy(&self, now_nanos: u64) -> bool {
        self.session.phase() == SessionPhase::LoggedOn
            && self.error_count(now_nanos) < DEFAULT_ERROR_THRESHOLD
            && self.cooldown_remaining.load(Ordering::Relaxed) == 0
    }
}

pub struct RoutingEngine {
    venues: DashMap<SessionId, Venue>,
    symbol_venues: DashMap<String, Vec<SessionId>>,
    selector: Box<dyn VenueSelector>,
    clock: Arc<dyn Clock>,
}

impl RoutingEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_selector(clock, Box::new(RoundRobinSelector::default()))
    }

    pub fn with_selector(clock: Arc<dyn Clock>, selector: Box<dyn VenueSelector>) -> Self {
        Self {
            venues: DashMap::new(),
            symbol_venues: DashMap::new(),
            selector,
            clock,
        }
    }

    /// Register a session (and its dedicated order manager) as eligible to
    /// carry orders for `symbols`.
    pub fn add_venue(&self, session: Arc<Session>, order_manager: Arc<OrderManager>, symbols: &[&str]) {
        let id = session.id().clone();
        self.venues.insert(
            id.clone(),
            Venue {
                session,
                order_manager,
                error_timestamps: Mutex::new(VecDeque::new()),
                cooldown_remaining: AtomicU32::new(0),
            },
        );
        for symbol in symbols {
            self.symbol_venues.entry(symbol.to_string()).or_default().push(id.clone());
        }
    }

    /// Initialize → connect all configured sessions. Each session's
    /// failure is isolated: a connect failure on one venue is logged and
    /// does not prevent the others from starting.
    pub fn connect_all(&self) {
        for entry in self.venues.iter() {
            if let Err(err) = entry.value().session.connect_with_retry() {
                tracing::warn!(session = %entry.key(), error = %err, "venue failed to connect during startup");
            }
        }
    }

    /// Drain: request logout on every still-connected session. Does not
    /// block waiting for the Logout acknowledgement; callers that need
    /// that guarantee should poll `is_running`.
    pub fn drain(&self) {
        for entry in self.venues.iter() {
            if entry.value().session.phase() == SessionPhase::LoggedOn {
                let _ = entry.value().session.disconnect();
            }
        }
    }

    /// True as long as at least one venue is `LoggedOn`.
    pub fn is_running(&self) -> bool {
        self.venues.iter().any(|v| v.session.phase() == SessionPhase::LoggedOn)
    }

    fn healthy_candidates(&self, symbol: &str) -> Vec<SessionId> {
        let now = self.clock.hardware_now_nanos();
        let Some(candidates) = self.symbol_venues.get(symbol) else {
            return Vec::new();
        };
        candidates
            .iter()
            .filter(|id| self.venues.get(*id).map(|v| v.is_healthy(now)).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Select a venue for `symbol`, submit the order to that venue's order
    /// manager, and send it. Returns the assigned client-order-id.
    pub fn submit_order(&self, symbol: &str, request: NewOrderRequest) -> EngineResult<String> {
        let candidates = self.healthy_candidates(symbol);
        let selected = self
            .selector
            .select(symbol, &candidates)
            .ok_or_else(|| EngineError::routing(format!("no healthy venue for symbol {symbol}")))?;

        let venue = self
            .venues
            .get(&selected)
            .ok_or_else(|| EngineError::routing("selected venue no longer registered"))?;

        let (client_order_id, fields) = venue.order_manager.submit_new_order(request, self.clock.as_ref())?;
        if let Err(err) = venue.session.send_application(MsgType::NewOrderSingle, fields) {
            venue.record_error(self.clock.hardware_now_nanos());
            return Err(err);
        }
        Ok(client_order_id)
    }

    /// Route an inbound execution report to the order manager that owns
    /// the referenced order, based on which session it arrived on.
    pub fn dispatch_execution_report(&self, session_id: &SessionId, env: &crate::message::Envelope) -> Option<OrderEvent> {
        let venue = self.venues.get(session_id)?;
        Some(venue.order_manager.on_execution_report(env, self.clock.as_ref()))
    }

    pub fn record_heartbeat_success(&self, session_id: &SessionId) {
        if let Some(venue) = self.venues.get(session_id) {
            venue.record_heartbeat_success();
        }
    }

    pub fn record_error(&self, session_id: &SessionId) {
        if let Some(venue) = self.venues.get(session_id) {
            venue.record_error(self.clock.hardware_now_nanos());
        }
    }

    pub fn venue_count(&self) -> usize {
        self.venues.len()
    }

    pub fn order_manager_for(&self, session_id: &SessionId) -> Option<Arc<OrderManager>> {
        self.venues.get(session_id).map(|v| v.order_manager.clone())
    }
}
