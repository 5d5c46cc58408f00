//! Order Manager (C4): owns every order for the life of the engine process,
//! keyed by client-order-id, with a non-owning secondary index from
//! venue-order-id back to that key.
//!
//! `Order` carries its status as a plain enum field rather than a
//! typestate — client-order-id-keyed map storage, a secondary venue-order-id
//! index, and revertible `PendingCancel`/`PendingReplace` states (which
//! snap back to whatever status preceded them on reject) don't fit a
//! zero-sized-type-per-state encoding without boxing every transition.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::core::clock::Clock;
use crate::core::errors::{EngineError, EngineResult};
use crate::core::types::{ExecType, OrdStatus, OrderType, Side, TimeInForce};
use crate::message::Envelope;

pub const DEFAULT_PENDING_NEW_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_COMPLETED_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub client_order_id: String,
    pub venue_order_id: Option<String>,
    pub exec_type: ExecType,
    pub last_quantity: Decimal,
    pub last_price: Decimal,
    pub cumulative_quantity: Decimal,
    pub average_price: Decimal,
    pub execution_time_micros: i64,
    pub hardware_timestamp_nanos: u64,
}

#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub expire_time_micros: Option<i64>,
    pub algo_id: Option<String>,
    pub trading_capacity: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub client_order_id: String,
    pub venue_order_id: Option<String>,
    pub orig_client_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub original_quantity: Decimal,
    pub filled_quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub status: OrdStatus,
    /// Status to revert to if a pending cancel/replace is rejected.
    pending_revert: Option<OrdStatus>,
    pub average_price: Decimal,
    pub algo_id: Option<String>,
    pub trading_capacity: Option<String>,
    pub creation_timestamp_nanos: u64,
    pub last_update_timestamp_nanos: u64,
    pub executions: Vec<ExecutionRecord>,
}

impl Order {
    pub fn leaves_quantity(&self) -> Decimal {
        self.original_quantity - self.filled_quantity
    }
}

#[derive(Debug, Clone)]
pub enum OrderEvent {
    Accepted { client_order_id: String },
    PartiallyFilled { client_order_id: String, last_quantity: Decimal, last_price: Decimal },
    Filled { client_order_id: String, last_quantity: Decimal, last_price: Decimal },
    Canceled { client_order_id: String },
    Replaced { client_order_id: String },
    Rejected { client_order_id: String, reason: String },
    CancelRejected { client_order_id: String, reason: String },
    /// Execution report referenced a client-order-id this manager never
    /// issued; recorded for observability, no state synthesized.
    UnknownOrder { client_order_id: String },
}

pub enum MassCancelScope<'a> {
    AllOrders,
    Symbol(&'a str),
}

pub struct OrderManager {
    active: DashMap<String, Order>,
    order_id_index: DashMap<String, String>,
    completed: Mutex<VecDeque<Order>>,
    completed_capacity: usize,
    pending_new_timeout: Duration,
    next_seq: AtomicU64,
}

impl OrderManager {
    pub fn new(pending_new_timeout: Duration, completed_capacity: usize) -> Self {
        Self {
            active: DashMap::new(),
            order_id_index: DashMap::new(),
            completed: Mutex::new(VecDeque::with_capacity(completed_capacity.min(1024))),
            completed_capacity,
            pending_new_timeout,
            next_seq: AtomicU64::new(1),
        }
    }

    fn next_client_order_id(&self) -> String {
        let n = self.next_seq.fetch_add(1, Ordering::Relaxed);
        format!("ORD{n:010}")
    }

    fn validate(req: &NewOrderRequest) -> EngineResult<()> {
        if req.symbol.is_empty() {
            return Err(EngineError::validation("symbol", "must not be empty"));
        }
        if req.quantity <= Decimal::ZERO {
            return Err(EngineError::validation("quantity", "must be positive"));
        }
        match req.order_type {
            OrderType::Limit if req.limit_price.map(|p| p <= Decimal::ZERO).unwrap_or(true) => {
                return Err(EngineError::validation("limit_price", "required and must be positive for limit orders"));
            }
            OrderType::Stop | OrderType::StopLimit
                if req.stop_price.map(|p| p <= Decimal::ZERO).unwrap_or(true) =>
            {
                return Err(EngineError::validation("stop_price", "required and must be positive for stop orders"));
            }
            _ => {}
        }
        if req.time_in_force == TimeInForce::GTD && req.expire_time_micros.is_none() {
            return Err(EngineError::validation("expire_time", "required when time_in_force is GTD"));
        }
        Ok(())
    }

    /// Validate and register a new order, returning its client-order-id
    /// and the fields the caller should pass to the codec to build `35=D`.
    /// No wire message is emitted on validation failure.
    pub fn submit_new_order(
        &self,
        req: NewOrderRequest,
        clock: &dyn Clock,
    ) -> EngineResult<(String, Vec<(u16, String)>)> {
        Self::validate(&req)?;

        let client_order_id = self.next_client_order_id();
        let now_nanos = clock.hardware_now_nanos();
        let now_micros = clock.wall_now_micros();

        let mut fields = vec![
            (11u16, client_order_id.clone()),
            (21, "1".to_string()), // HandlInst: automated, no broker intervention
            (55, req.symbol.clone()),
            (54, req.side.fix_code().to_string()),
            (60, crate::core::clock::format_fix_timestamp_millis(now_micros)),
            (40, req.order_type.fix_code().to_string()),
            (38, req.quantity.to_string()),
            (59, req.time_in_force.fix_code().to_string()),
        ];
        if let Some(price) = req.limit_price {
            fields.push((44, price.to_string()));
        }
        if let Some(price) = req.stop_price {
            fields.push((99, price.to_string()));
        }
        if let Some(expire) = req.expire_time_micros {
            fields.push((126, crate::core::clock::format_fix_timestamp_millis(expire)));
        }
        if let Some(algo_id) = &req.algo_id {
            fields.push((9001, algo_id.clone())); // user-defined tag range (>=5000): AlgorithmID
        }
        if let Some(capacity) = &req.trading_capacity {
            fields.push((47, capacity.clone())); // Rule80A / OrderCapacity
        }

        let order = Order {
            client_order_id: client_order_id.clone(),
            venue_order_id: None,
            orig_client_order_id: None,
            symbol: req.symbol,
            side: req.side,
            order_type: req.order_type,
            original_quantity: req.quantity,
            filled_quantity: Decimal::ZERO,
            limit_price: req.limit_price,
            stop_price: req.stop_price,
            time_in_force: req.time_in_force,
            status: OrdStatus::PendingNew,
            pending_revert: None,
            average_price: Decimal::ZERO,
            algo_id: req.algo_id,
            trading_capacity: req.trading_capacity,
            creation_timestamp_nanos: now_nanos,
            last_update_timestamp_nanos: now_nanos,
            executions: Vec::new(),
        };
        self.active.insert(client_order_id.clone(), order);

        Ok((client_order_id, fields))
    }

    /// Request cancellation of an active order, transitioning it to
    /// `PendingCancel` and returning the fields for `35=F`.
    pub fn request_cancel(&self, client_order_id: &str, clock: &dyn Clock) -> EngineResult<(String, Vec<(u16, String)>)> {
        let mut entry = self
            .active
            .get_mut(client_order_id)
            .ok_or_else(|| EngineError::validation("client_order_id", "unknown or already terminal order"))?;

        if entry.status.is_terminal() {
            return Err(EngineError::validation("client_order_id", "order already terminal"));
        }

        let new_cl_ord_id = self.next_client_order_id();
        let fields = vec![
            (11u16, new_cl_ord_id.clone()),
            (41, client_order_id.to_string()),
            (55, entry.symbol.clone()),
            (54, entry.side.fix_code().to_string()),
            (60, crate::core::clock::format_fix_timestamp_millis(clock.wall_now_micros())),
        ];
        entry.pending_revert = Some(entry.status);
        entry.status = OrdStatus::PendingCancel;
        entry.last_update_timestamp_nanos = clock.hardware_now_nanos();

        Ok((new_cl_ord_id, fields))
    }

    /// Request replacement (quantity and/or price change). Per the spec, a
    /// replace uses a fresh client-order-id with `OrigClOrdID` as a
    /// back-reference; the original order's identity is not reused.
    pub fn request_replace(
        &self,
        client_order_id: &str,
        new_quantity: Option<Decimal>,
        new_limit_price: Option<Decimal>,
        clock: &dyn Clock,
    ) -> EngineResult<(String, Vec<(u16, String)>)> {
        let mut entry = self
            .active
            .get_mut(client_order_id)
            .ok_or_else(|| EngineError::validation("client_order_id", "unknown or already terminal order"))?;

        if entry.status.is_terminal() {
            return Err(EngineError::validation("client_order_id", "order already terminal"));
        }

        let new_cl_ord_id = self.next_client_order_id();
        let quantity = new_quantity.unwrap_or(entry.original_quantity);
        let limit_price = new_limit_price.or(entry.limit_price);

        let mut fields = vec![
            (11u16, new_cl_ord_id.clone()),
            (41, client_order_id.to_string()),
            (55, entry.symbol.clone()),
            (54, entry.side.fix_code().to_string()),
            (60, crate::core::clock::format_fix_timestamp_millis(clock.wall_now_micros())),
            (40, entry.order_type.fix_code().to_string()),
            (38, quantity.to_string()),
        ];
        if let Some(price) = limit_price {
            fields.push((44, price.to_string()));
        }

        entry.pending_revert = Some(entry.status);
        entry.status = OrdStatus::PendingReplace;
        entry.orig_client_order_id = Some(client_order_id.to_string());
        entry.last_update_timestamp_nanos = clock.hardware_now_nanos();

        Ok((new_cl_ord_id, fields))
    }

    /// Apply `35=8` (ExecutionReport) to the order it references. Steps
    /// match the execution-report processing algorithm exactly.
    pub fn on_execution_report(&self, env: &Envelope, clock: &dyn Clock) -> OrderEvent {
        let client_order_id = match env.field(11) {
            Some(id) => id.to_string(),
            None => return OrderEvent::UnknownOrder { client_order_id: String::new() },
        };

        let Some(mut order) = self.active.get_mut(&client_order_id) else {
            return OrderEvent::UnknownOrder { client_order_id };
        };

        let new_status = env.field(39).map(OrdStatus::from_code).unwrap_or(OrdStatus::Unknown);
        if new_status != OrdStatus::Unknown {
            order.status = new_status;
        }
        order.last_update_timestamp_nanos = clock.hardware_now_nanos();

        if let Some(cum) = env.field(14).and_then(|s| s.parse::<Decimal>().ok()) {
            order.filled_quantity = cum;
        }
        if let Some(avg) = env.field(6).and_then(|s| s.parse::<Decimal>().ok()) {
            order.average_price = avg;
        }

        let exec_type_code = env.field(150).unwrap_or("");
        let mut event = match new_status {
            OrdStatus::New => OrderEvent::Accepted { client_order_id: client_order_id.clone() },
            OrdStatus::Rejected => OrderEvent::Rejected {
                client_order_id: client_order_id.clone(),
                reason: env.field(58).unwrap_or("").to_string(),
            },
            OrdStatus::Canceled => OrderEvent::Canceled { client_order_id: client_order_id.clone() },
            OrdStatus::Replaced => OrderEvent::Replaced { client_order_id: client_order_id.clone() },
            _ => OrderEvent::Accepted { client_order_id: client_order_id.clone() },
        };

        if exec_type_code == "F" {
            let last_qty = env.field(32).and_then(|s| s.parse::<Decimal>().ok()).unwrap_or(Decimal::ZERO);
            let last_px = env.field(31).and_then(|s| s.parse::<Decimal>().ok()).unwrap_or(Decimal::ZERO);
            let venue_order_id = order.venue_order_id.clone();
            let exec_type = if order.status == OrdStatus::Filled { ExecType::Fill } else { ExecType::PartialFill };
            let cumulative_quantity = order.filled_quantity;
            let average_price = order.average_price;
            let hardware_timestamp_nanos = order.last_update_timestamp_nanos;
            order.executions.push(ExecutionRecord {
                execution_id: env.field(17).unwrap_or("").to_string(),
                client_order_id: client_order_id.clone(),
                venue_order_id,
                exec_type,
                last_quantity: last_qty,
                last_price: last_px,
                cumulative_quantity,
                average_price,
                execution_time_micros: clock.wall_now_micros(),
                hardware_timestamp_nanos,
            });
            event = if order.status == OrdStatus::Filled {
                OrderEvent::Filled { client_order_id: client_order_id.clone(), last_quantity: last_qty, last_price: last_px }
            } else {
                OrderEvent::PartiallyFilled { client_order_id: client_order_id.clone(), last_quantity: last_qty, last_price: last_px }
            };
        }

        if let Some(venue_order_id) = env.field(37) {
            if order.venue_order_id.as_deref() != Some(venue_order_id) {
                order.venue_order_id = Some(venue_order_id.to_string());
                self.order_id_index.insert(venue_order_id.to_string(), client_order_id.clone());
            }
        }

        let is_terminal = order.status.is_terminal();
        drop(order);
        if is_terminal {
            self.retire(&client_order_id);
        }
        event
    }

    /// Apply `35=9` (OrderCancelReject): revert the order to whatever
    /// status preceded the pending cancel/replace.
    pub fn on_cancel_reject(&self, env: &Envelope) -> OrderEvent {
        let client_order_id = env.field(41).unwrap_or("").to_string(); // OrigClOrdID: the still-live order
        let reason = env.field(58).unwrap_or("").to_string();

        if let Some(mut order) = self.active.get_mut(&client_order_id) {
            if let Some(prior) = order.pending_revert.take() {
                order.status = prior;
            }
        }

        OrderEvent::CancelRejected { client_order_id, reason }
    }

    /// Transition every matching non-terminal order to `PendingCancel` and
    /// return the affected client-order-ids (the caller still has to send
    /// the `35=q` message itself; this call only updates local state).
    pub fn apply_mass_cancel(&self, scope: MassCancelScope<'_>, clock: &dyn Clock) -> Vec<String> {
        let mut affected = Vec::new();
        for mut entry in self.active.iter_mut() {
            if entry.status.is_terminal() {
                continue;
            }
            let matches = match scope {
                MassCancelScope::AllOrders => true,
                MassCancelScope::Symbol(symbol) => entry.symbol == symbol,
            };
            if matches {
                entry.pending_revert = Some(entry.status);
                entry.status = OrdStatus::PendingCancel;
                entry.last_update_timestamp_nanos = clock.hardware_now_nanos();
                affected.push(entry.client_order_id.clone());
            }
        }
        affected
    }

    /// Scan for orders stuck in `PendingNew` past the timeout and mark them
    /// locally `Rejected` (no cancel is sent to the venue).
    pub fn check_pending_new_timeouts(&self, clock: &dyn Clock) -> Vec<OrderEvent> {
        let now = clock.hardware_now_nanos();
        let threshold_nanos = self.pending_new_timeout.as_nanos() as u64;
        let mut expired = Vec::new();

        for mut entry in self.active.iter_mut() {
            if entry.status == OrdStatus::PendingNew
                && now.saturating_sub(entry.creation_timestamp_nanos) > threshold_nanos
            {
                entry.status = OrdStatus::Rejected;
                expired.push(entry.client_order_id.clone());
            }
        }
        for client_order_id in &expired {
            self.retire(client_order_id);
        }
        expired
            .into_iter()
            .map(|client_order_id| OrderEvent::Rejected { client_order_id, reason: "pending_new_timeout".to_string() })
            .collect()
    }

    pub fn get(&self, client_order_id: &str) -> Option<Order> {
        self.active.get(client_order_id).map(|e| e.clone())
    }

    pub fn find_by_venue_order_id(&self, venue_order_id: &str) -> Option<Order> {
        let client_order_id = self.order_id_index.get(venue_order_id)?;
        self.get(&client_order_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn retire(&self, client_order_id: &str) {
        if let Some((_, order)) = self.active.remove(client_order_id) {
            let mut completed = self.completed.lock();
            if completed.len() >= self.completed_capacity {
                completed.pop_front();
            }
            completed.push_back(order);
        }
    }
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_NEW_TIMEOUT, DEFAULT_COMPLETED_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SystemClock;
    use rust_decimal_macros::dec;

    fn limit_order(qty: Decimal, price: Decimal) -> NewOrderRequest {
        NewOrderRequest {
            symbol: "MSFT".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: qty,
            limit_price: Some(price),
            stop_price: None,
            time_in_force: TimeInForce::Day,
            expire_time_micros: None,
            algo_id: None,
            trading_capacity: None,
        }
    }

    #[test]
    fn rejects_non_positive_quantity_without_emitting_a_message() {
        let mgr = OrderManager::default();
        let clock = SystemClock::new();
        let result = mgr.submit_new_order(limit_order(Decimal::ZERO, dec!(50.10)), &clock);
        assert!(result.is_err());
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn rejects_limit_order_without_limit_price() {
        let mgr = OrderManager::default();
        let clock = SystemClock::new();
        let mut req = limit_order(dec!(100), dec!(50));
        req.limit_price = None;
        assert!(mgr.submit_new_order(req, &clock).is_err());
    }

    #[test]
    fn partial_fill_then_fill_computes_weighted_average_price() {
        let mgr = OrderManager::default();
        let clock = SystemClock::new();
        let (cl_ord_id, _fields) = mgr.submit_new_order(limit_order(dec!(1000), dec!(50.10)), &clock).unwrap();

        let pool = crate::pool::MessagePool::new(4, 512);
        let header = crate::codec::Header {
            sender_comp_id: "VENUE".to_string(),
            target_comp_id: "BUYSIDE".to_string(),
            msg_seq_num: 1,
            sending_time_micros: 0,
        };

        let mut out = Vec::new();
        let partial_fields = vec![
            (11u16, cl_ord_id.clone()),
            (37, "VENUE-1".to_string()),
            (17, "EXEC-1".to_string()),
            (150, "F".to_string()),
            (39, "1".to_string()),
            (55, "MSFT".to_string()),
            (54, "1".to_string()),
            (32, "400".to_string()),
            (31, "50.10".to_string()),
            (14, "400".to_string()),
            (6, "50.10".to_string()),
        ];
        crate::codec::build(&crate::core::types::MsgType::ExecutionReport, &header, &partial_fields, &mut out).unwrap();
        let (env, _) = crate::codec::parse(&out, &pool, 0).unwrap();
        let event = mgr.on_execution_report(&env, &clock);
        assert!(matches!(event, OrderEvent::PartiallyFilled { .. }));

        let order = mgr.get(&cl_ord_id).unwrap();
        assert_eq!(order.status, OrdStatus::PartiallyFilled);
        assert_eq!(order.leaves_quantity(), dec!(600));
        assert_eq!(order.average_price, dec!(50.10));

        let mut out2 = Vec::new();
        let fill_fields = vec![
            (11u16, cl_ord_id.clone()),
            (37, "VENUE-1".to_string()),
            (17, "EXEC-2".to_string()),
            (150, "F".to_string()),
            (39, "2".to_string()),
            (55, "MSFT".to_string()),
            (54, "1".to_string()),
            (32, "600".to_string()),
            (31, "50.20".to_string()),
            (14, "1000".to_string()),
            (6, "50.16".to_string()),
        ];
        crate::codec::build(&crate::core::types::MsgType::ExecutionReport, &header, &fill_fields, &mut out2).unwrap();
        let (env2, _) = crate::codec::parse(&out2, &pool, 0).unwrap();
        let event2 = mgr.on_execution_report(&env2, &clock);
        assert!(matches!(event2, OrderEvent::Filled { .. }));

        // Order reached a terminal status: no longer active, but recorded.
        assert!(mgr.get(&cl_ord_id).is_none());
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn cancel_reject_reverts_to_prior_status() {
        let mgr = OrderManager::default();
        let clock = SystemClock::new();
        let (cl_ord_id, _) = mgr.submit_new_order(limit_order(dec!(500), dec!(10)), &clock).unwrap();

        // Move the order to New (as if an acknowledging ExecutionReport arrived).
        {
            let mut order = mgr.active.get_mut(&cl_ord_id).unwrap();
            order.status = OrdStatus::New;
        }

        let (_new_cl_ord_id, _fields) = mgr.request_cancel(&cl_ord_id, &clock).unwrap();
        assert_eq!(mgr.get(&cl_ord_id).unwrap().status, OrdStatus::PendingCancel);

        let pool = crate::pool::MessagePool::new(4, 512);
        let header = crate::codec::Header {
            sender_comp_id: "VENUE".to_string(),
            target_comp_id: "BUYSIDE".to_string(),
            msg_seq_num: 1,
            sending_time_micros: 0,
        };
        let mut out = Vec::new();
        let reject_fields = vec![
            (11u16, "NEWID".to_string()),
            (41, cl_ord_id.clone()),
            (102, "0".to_string()),
            (58, "TOO_LATE_TO_CANCEL".to_string()),
            (39, "0".to_string()),
            (37, "VENUE-1".to_string()),
            (17, "EXEC-1".to_string()),
            (150, "8".to_string()),
            (55, "MSFT".to_string()),
            (54, "1".to_string()),
        ];
        crate::codec::build(&crate::core::types::MsgType::OrderCancelReject, &header, &reject_fields, &mut out).unwrap();
        let (env, _) = crate::codec::parse(&out, &pool, 0).unwrap();

        let event = mgr.on_cancel_reject(&env);
        assert!(matches!(event, OrderEvent::CancelRejected { .. }));
        assert_eq!(mgr.get(&cl_ord_id).unwrap().status, OrdStatus::New);
        assert_eq!(mgr.get(&cl_ord_id).unwrap().leaves_quantity(), dec!(500));
    }

    #[test]
    fn pending_new_past_timeout_is_rejected_without_sending_cancel() {
        let mgr = OrderManager::new(Duration::from_nanos(1), DEFAULT_COMPLETED_CAPACITY);
        let clock = SystemClock::new();
        let (cl_ord_id, _) = mgr.submit_new_order(limit_order(dec!(10), dec!(1)), &clock).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let events = mgr.check_pending_new_timeouts(&clock);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], OrderEvent::Rejected { client_order_id, .. } if client_order_id == &cl_ord_id));
        assert!(mgr.get(&cl_ord_id).is_none());
    }

    #[test]
    fn mass_cancel_touches_only_matching_symbol() {
        let mgr = OrderManager::default();
        let clock = SystemClock::new();
        let (msft_id, _) = mgr.submit_new_order(limit_order(dec!(10), dec!(1)), &clock).unwrap();
        let mut other = limit_order(dec!(10), dec!(1));
        other.symbol = "AAPL".to_string();
        let (aapl_id, _) = mgr.submit_new_order(other, &clock).unwrap();

        let affected = mgr.apply_mass_cancel(MassCancelScope::Symbol("MSFT"), &clock);
        assert_eq!(affected, vec![msft_id.clone()]);
        assert_eq!(mgr.get(&msft_id).unwrap().status, OrdStatus::PendingCancel);
        assert_eq!(mgr.get(&aapl_id).unwrap().status, OrdStatus::PendingNew);
    }
}
