//! Low-level allocation-avoidance primitives shared by the message pool,
//! session, and order manager.

pub mod pools;

pub use pools::{Pool, Poolable, PoolStats};
