//! Connects one session to a venue, logs on, submits a single order, and
//! prints execution reports as they arrive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use fix_bins::common::{init_logging, CommonArgs};
use fix_core::core::clock::SystemClock;
use fix_core::order::{NewOrderRequest, OrderManager};
use fix_core::pool::MessagePool;
use fix_core::resilience::install_panic_handler;
use fix_core::routing::RoutingEngine;
use fix_core::session::{Session, SessionConfig, SessionId, SessionEvent};
use rust_decimal_macros::dec;

fn main() -> Result<()> {
    let args = CommonArgs::parse();
    init_logging(&args)?;
    install_panic_handler();

    let id = SessionId {
        sender_comp_id: args.sender_comp_id.clone(),
        target_comp_id: args.target_comp_id.clone(),
    };
    let pool = Arc::new(MessagePool::new(256, 4096));
    let session = Arc::new(Session::new(
        id.clone(),
        SessionConfig {
            target_addr: format!("{}:{}", args.host, args.port),
            heartbeat_interval: Duration::from_secs(30),
            ..Default::default()
        },
        pool,
    ));

    let clock: Arc<dyn fix_core::core::clock::Clock> = Arc::new(SystemClock::new());
    let routing = RoutingEngine::new(clock);
    let order_manager = Arc::new(OrderManager::default());
    routing.add_venue(session.clone(), order_manager.clone(), &["MSFT"]);

    tracing::info!(session = %id, "connecting");
    session.connect_with_retry()?;

    let mut read_buf = vec![0u8; 65_536];
    let mut pending = Vec::new();
    wait_for_logon(&session, &mut read_buf, &mut pending)?;
    tracing::info!(session = %id, "logged on");

    let client_order_id = routing.submit_order(
        "MSFT",
        NewOrderRequest {
            symbol: "MSFT".to_string(),
            side: fix_core::core::types::Side::Buy,
            order_type: fix_core::core::types::OrderType::Limit,
            quantity: dec!(100),
            limit_price: Some(dec!(50.00)),
            stop_price: None,
            time_in_force: fix_core::core::types::TimeInForce::Day,
            expire_time_micros: None,
            algo_id: None,
            trading_capacity: None,
        },
    )?;
    tracing::info!(client_order_id = %client_order_id, "order submitted");

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrlc = running.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("received Ctrl+C, shutting down session");
        running_ctrlc.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        let n = read_some(&session, &mut read_buf)?;
        if n == 0 {
            continue;
        }
        pending.extend_from_slice(&read_buf[..n]);
        let (events, consumed) = session.on_bytes_received(&pending)?;
        pending.drain(..consumed);

        for event in events {
            if let SessionEvent::Application(env) = event {
                if let Some(exec_event) = routing.dispatch_execution_report(&id, &env) {
                    tracing::info!(?exec_event, "execution event");
                }
            }
        }
    }

    session.disconnect()?;
    Ok(())
}

fn wait_for_logon(session: &Arc<Session>, read_buf: &mut [u8], pending: &mut Vec<u8>) -> Result<()> {
    use fix_core::session::SessionPhase;
    loop {
        if session.phase() == SessionPhase::LoggedOn {
            return Ok(());
        }
        if session.phase() == SessionPhase::Faulted {
            bail!("session faulted before logon completed");
        }
        let n = read_some(session, read_buf)?;
        if n > 0 {
            pending.extend_from_slice(&read_buf[..n]);
            let (_events, consumed) = session.on_bytes_received(pending)?;
            pending.drain(..consumed);
        }
    }
}

fn read_some(session: &Arc<Session>, buf: &mut [u8]) -> Result<usize> {
    Ok(session.recv_raw(buf)?)
}
