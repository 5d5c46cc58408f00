//! fix-core — message pooling, wire codec, session management, order
//! management, routing, and market-data normalization for a FIX 4.4
//! engine.
//!
//! ## Architecture
//! - **Pool-owned messages.** Envelopes and their backing buffers are
//!   checked out of a shared pool and returned on every exit path; the
//!   hot path allocates only when the pool is exhausted.
//! - **Single-writer-lock sessions.** Each session serializes outbound
//!   bytes under one lock while the inbound reader tracks sequence state
//!   independently, so a heartbeat send never blocks on inbound parsing.
//! - **Enum-status order state.** Orders are tracked by status rather
//!   than as a typestate chain, since cancel/replace transitions need to
//!   be revertible on reject.
//!
//! ## Core Modules
//! - `pool`: message/buffer pool (C1)
//! - `codec`: wire parse/build/validate (C2)
//! - `session`: transport lifecycle and sequence discipline (C3)
//! - `order`: order lifecycle and execution-report processing (C4)
//! - `routing`: venue selection and health tracking (C5)
//! - `market_data`: subscription and book normalization (C6)
//! - `core::clock`: monotonic and wall-clock time sources (C7)

pub mod core;
pub mod message;
pub mod pool;
pub mod codec;

pub mod session;
pub mod order;
pub mod routing;
pub mod market_data;

pub mod config;
pub mod monitoring;
pub mod utils;

pub mod resilience;
pub mod perf;

pub use core::{Clock, EngineError, EngineResult, SystemClock};
pub use core::types::{ExecType, MsgType, OrdStatus, OrderType, Side, TimeInForce};
pub use message::Envelope;
pub use pool::MessagePool;

pub use session::{Session, SessionConfig, SessionId, SessionPhase};
pub use order::{NewOrderRequest, Order, OrderEvent, OrderManager};
pub use routing::{RoundRobinSelector, RoutingEngine, VenueSelector};
pub use market_data::{EntryType, MarketDataManager, NormalizedBook};

pub use anyhow::{Error, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::core::{Clock, EngineError, EngineResult, SystemClock};
    pub use crate::core::types::{ExecType, MsgType, OrdStatus, OrderType, Side, TimeInForce};
    pub use crate::message::Envelope;
    pub use crate::pool::MessagePool;

    pub use crate::session::{Session, SessionConfig, SessionId, SessionPhase};
    pub use crate::order::{NewOrderRequest, Order, OrderEvent, OrderManager};
    pub use crate::routing::{RoundRobinSelector, RoutingEngine, VenueSelector};
    pub use crate::market_data::{EntryType, MarketDataManager, NormalizedBook};

    pub use crate::{Error, Result};
}
