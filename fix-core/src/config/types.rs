//! Structured configuration objects. No environment-variable or
//! file-format is mandated here: callers build these by hand or layer
//! their own loader (TOML, env, flags) on top and construct the same
//! structs, matching the "structured configuration object" contract.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::BackoffConfig;
use crate::session::TlsConfig;

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (value.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Per-engine settings shared across every session the engine manages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub sender_comp_id: String,
    pub message_pool_size: usize,
    pub max_message_size: usize,
    #[serde(with = "duration_millis")]
    pub default_heartbeat_interval: Duration,
    pub metrics_addr: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sender_comp_id: String::new(),
            message_pool_size: 256,
            max_message_size: 4096,
            default_heartbeat_interval: Duration::from_secs(30),
            metrics_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Per-venue connection settings. Distinct from [`crate::session::SessionConfig`]
/// in that it additionally carries the identity (target-comp-id, symbols)
/// needed to register the session with the routing engine; `into_session_config`
/// extracts the subset `Session` itself needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub target_comp_id: String,
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub tls_server_name: Option<String>,
    #[serde(with = "duration_millis")]
    pub heartbeat_interval: Duration,
    pub reset_seq_num_on_logon: bool,
    pub reconnect: Option<BackoffConfig>,
    pub symbols: Vec<String>,
}

impl VenueConfig {
    pub fn into_session_config(self) -> crate::session::SessionConfig {
        let tls = if self.use_tls {
            Some(TlsConfig {
                server_name: self.tls_server_name.unwrap_or_else(|| self.host.clone()),
            })
        } else {
            None
        };
        crate::session::SessionConfig {
            target_addr: format!("{}:{}", self.host, self.port),
            heartbeat_interval: self.heartbeat_interval,
            reset_seq_num_on_logon: self.reset_seq_num_on_logon,
            reconnect: self.reconnect,
            tls,
            ..Default::default()
        }
    }
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            target_comp_id: String::new(),
            host: String::new(),
            port: 0,
            use_tls: false,
            tls_server_name: None,
            heartbeat_interval: Duration::from_secs(30),
            reset_seq_num_on_logon: false,
            reconnect: None,
            symbols: Vec::new(),
        }
    }
}

/// A previously-persisted (out_seq, in_seq) pair for a session, handed
/// back to the session on startup so it can resume instead of resetting
/// to 1. The storage medium (file, database, mmap region) is the caller's
/// choice; this crate only defines the hook.
pub trait SequenceStore: Send + Sync {
    fn load(&self, session_id: &crate::session::SessionId) -> Option<(u32, u32)>;
    fn store(&self, session_id: &crate::session::SessionId, out_seq: u32, in_seq: u32);
}

/// No-op store: every session starts at sequence 1, matching a venue that
/// honors `141=Y` (ResetSeqNumFlag) on every logon.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSequenceStore;

impl SequenceStore for NullSequenceStore {
    fn load(&self, _session_id: &crate::session::SessionId) -> Option<(u32, u32)> {
        None
    }

    fn store(&self, _session_id: &crate::session::SessionId, _out_seq: u32, _in_seq: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_config_without_tls_produces_plain_session_config() {
        let venue = VenueConfig {
            host: "venue.example.com".to_string(),
            port: 9001,
            ..Default::default()
        };
        let session_config = venue.into_session_config();
        assert_eq!(session_config.target_addr, "venue.example.com:9001");
        assert!(session_config.tls.is_none());
    }

    #[test]
    fn venue_config_with_tls_carries_server_name() {
        let venue = VenueConfig {
            host: "venue.example.com".to_string(),
            port: 9001,
            use_tls: true,
            ..Default::default()
        };
        let session_config = venue.into_session_config();
        assert_eq!(session_config.tls.unwrap().server_name, "venue.example.com");
    }

    #[test]
    fn venue_config_round_trips_through_json() {
        let venue = VenueConfig {
            target_comp_id: "VENUE".to_string(),
            host: "venue.example.com".to_string(),
            port: 9001,
            use_tls: true,
            tls_server_name: Some("venue.example.com".to_string()),
            symbols: vec!["MSFT".to_string(), "AAPL".to_string()],
            ..Default::default()
        };
        let json = serde_json::to_string(&venue).unwrap();
        let restored: VenueConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.target_comp_id, venue.target_comp_id);
        assert_eq!(restored.symbols, venue.symbols);
        assert_eq!(restored.heartbeat_interval, venue.heartbeat_interval);
    }

    #[test]
    fn null_sequence_store_always_starts_fresh() {
        let store = NullSequenceStore;
        let id = crate::session::SessionId { sender_comp_id: "A".into(), target_comp_id: "B".into() };
        assert_eq!(store.load(&id), None);
        store.store(&id, 10, 5); // no-op, shouldn't panic
    }
}
