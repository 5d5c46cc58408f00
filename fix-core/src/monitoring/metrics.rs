//! Prometheus metrics for the wire/session subsystem.
//!
//! Four families: pool occupancy, session/sequence state, message
//! throughput, and tick-to-trade-style latency.

use prometheus::{Gauge, GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::Arc;
use tracing::info;

/// Central registry for all Prometheus metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    pool: Arc<PoolMetrics>,
    session: Arc<SessionMetrics>,
    throughput: Arc<ThroughputMetrics>,
    latency: Arc<LatencyMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let pool = Arc::new(PoolMetrics::new(&registry)?);
        let session = Arc::new(SessionMetrics::new(&registry)?);
        let throughput = Arc::new(ThroughputMetrics::new(&registry)?);
        let latency = Arc::new(LatencyMetrics::new(&registry)?);

        info!("Prometheus metrics registry initialized");

        Ok(Self {
            registry,
            pool,
            session,
            throughput,
            latency,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pool(&self) -> &PoolMetrics {
        &self.pool
    }

    pub fn session(&self) -> &SessionMetrics {
        &self.session
    }

    pub fn throughput(&self) -> &ThroughputMetrics {
        &self.throughput
    }

    pub fn latency(&self) -> &LatencyMetrics {
        &self.latency
    }
}

impl Default for MetricsRegistry {
    #[allow(clippy::panic)]
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::error!("FATAL: failed to create metrics registry: {}", e);
            panic!("cannot create metrics registry")
        })
    }
}

/// Message/buffer pool occupancy, per [`crate::pool::MessagePool`].
pub struct PoolMetrics {
    pub envelopes_in_use: IntGauge,
    pub envelopes_capacity: IntGauge,
    pub buffers_in_use: IntGauge,
    pub pool_exhaustion_total: IntGaugeVec,
}

impl PoolMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let envelopes_in_use = IntGauge::new("fix_pool_envelopes_in_use", "Envelopes currently checked out of the pool")?;
        registry.register(Box::new(envelopes_in_use.clone()))?;

        let envelopes_capacity = IntGauge::new("fix_pool_envelopes_capacity", "Configured envelope pool capacity")?;
        registry.register(Box::new(envelopes_capacity.clone()))?;

        let buffers_in_use = IntGauge::new("fix_pool_buffers_in_use", "Backing buffers currently checked out")?;
        registry.register(Box::new(buffers_in_use.clone()))?;

        let pool_exhaustion_total = IntGaugeVec::new(
            Opts::new("fix_pool_exhaustion_total", "Allocations that bypassed the pool after hitting its cap"),
            &["pool"],
        )?;
        registry.register(Box::new(pool_exhaustion_total.clone()))?;

        Ok(Self {
            envelopes_in_use,
            envelopes_capacity,
            buffers_in_use,
            pool_exhaustion_total,
        })
    }
}

/// Session connection phase and sequence-number state.
pub struct SessionMetrics {
    /// 1 if LoggedOn, 0 otherwise, labeled by session id.
    pub logged_on: IntGaugeVec,
    pub outgoing_seq_num: IntGaugeVec,
    pub incoming_seq_num: IntGaugeVec,
    pub gap_fills_total: IntCounterVec,
    pub faults_total: IntCounterVec,
}

impl SessionMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let logged_on = IntGaugeVec::new(
            Opts::new("fix_session_logged_on", "1 if the session is LoggedOn, 0 otherwise"),
            &["session"],
        )?;
        registry.register(Box::new(logged_on.clone()))?;

        let outgoing_seq_num = IntGaugeVec::new(
            Opts::new("fix_session_outgoing_seq_num", "Next outgoing MsgSeqNum"),
            &["session"],
        )?;
        registry.register(Box::new(outgoing_seq_num.clone()))?;

        let incoming_seq_num = IntGaugeVec::new(
            Opts::new("fix_session_incoming_seq_num", "Next expected inbound MsgSeqNum"),
            &["session"],
        )?;
        registry.register(Box::new(incoming_seq_num.clone()))?;

        let gap_fills_total = IntCounterVec::new(
            Opts::new("fix_session_gap_fills_total", "ResendRequests issued due to a detected sequence gap"),
            &["session"],
        )?;
        registry.register(Box::new(gap_fills_total.clone()))?;

        let faults_total = IntCounterVec::new(
            Opts::new("fix_session_faults_total", "Transitions into the Faulted phase"),
            &["session", "reason"],
        )?;
        registry.register(Box::new(faults_total.clone()))?;

        Ok(Self {
            logged_on,
            outgoing_seq_num,
            incoming_seq_num,
            gap_fills_total,
            faults_total,
        })
    }
}

/// Message volume by direction and type.
pub struct ThroughputMetrics {
    pub messages_sent_total: IntCounterVec,
    pub messages_received_total: IntCounterVec,
    pub orders_submitted_total: IntCounterVec,
    pub executions_received_total: IntCounterVec,
    pub venue_error_rate: GaugeVec,
}

impl ThroughputMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let messages_sent_total = IntCounterVec::new(
            Opts::new("fix_messages_sent_total", "Outbound FIX messages, by session and msg type"),
            &["session", "msg_type"],
        )?;
        registry.register(Box::new(messages_sent_total.clone()))?;

        let messages_received_total = IntCounterVec::new(
            Opts::new("fix_messages_received_total", "Inbound FIX messages, by session and msg type"),
            &["session", "msg_type"],
        )?;
        registry.register(Box::new(messages_received_total.clone()))?;

        let orders_submitted_total = IntCounterVec::new(
            Opts::new("fix_orders_submitted_total", "NewOrderSingle messages submitted, by symbol"),
            &["symbol"],
        )?;
        registry.register(Box::new(orders_submitted_total.clone()))?;

        let executions_received_total = IntCounterVec::new(
            Opts::new("fix_executions_received_total", "ExecutionReports processed, by exec type"),
            &["exec_type"],
        )?;
        registry.register(Box::new(executions_received_total.clone()))?;

        let venue_error_rate = GaugeVec::new(
            Opts::new("fix_venue_error_rate", "Errors observed in the rolling 60s window, by venue"),
            &["venue"],
        )?;
        registry.register(Box::new(venue_error_rate.clone()))?;

        Ok(Self {
            messages_sent_total,
            messages_received_total,
            orders_submitted_total,
            executions_received_total,
            venue_error_rate,
        })
    }
}

/// Latency distributions, measured with [`crate::core::clock::Clock::hardware_now_nanos`] deltas.
pub struct LatencyMetrics {
    pub parse_latency_ns: Histogram,
    pub build_latency_ns: Histogram,
    pub order_ack_latency_us: Histogram,
    pub queue_depth: Gauge,
}

impl LatencyMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let parse_latency_ns = Histogram::with_opts(
            HistogramOpts::new("fix_parse_latency_ns", "Wire-to-envelope parse latency in nanoseconds")
                .buckets(vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]),
        )?;
        registry.register(Box::new(parse_latency_ns.clone()))?;

        let build_latency_ns = Histogram::with_opts(
            HistogramOpts::new("fix_build_latency_ns", "Envelope-to-wire build latency in nanoseconds")
                .buckets(vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]),
        )?;
        registry.register(Box::new(build_latency_ns.clone()))?;

        let order_ack_latency_us = Histogram::with_opts(
            HistogramOpts::new(
                "fix_order_ack_latency_us",
                "Time from NewOrderSingle send to the first ExecutionReport, in microseconds",
            )
            .buckets(vec![100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 50000.0]),
        )?;
        registry.register(Box::new(order_ack_latency_us.clone()))?;

        let queue_depth = Gauge::new("fix_gap_fill_queue_depth", "Envelopes held pending a gap fill, summed across sessions")?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            parse_latency_ns,
            build_latency_ns,
            order_ack_latency_us,
            queue_depth,
        })
    }
}
