//! Configuration objects for the engine and its venues.
//!
//! No environment-variable or file-format is mandated: these are plain
//! structs a caller constructs directly or populates from whatever
//! loader (TOML, env, flags) fits their deployment.

pub mod types;

pub use types::{EngineConfig, NullSequenceStore, SequenceStore, VenueConfig};
