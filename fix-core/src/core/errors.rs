//! Engine error taxonomy.
//!
//! Six categories, each carrying enough context for a caller or an upstream
//! callback to act without re-deriving what went wrong. Implemented by hand
//! (`Display` + `std::error::Error`) rather than via a derive macro, to
//! keep the discriminant and message text under direct control — each
//! variant maps to a stable code a downstream system can match on.

use std::fmt;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Caller input violates a pre-send invariant. Returned synchronously;
    /// no wire activity results.
    Validation { field: String, reason: String },

    /// No healthy session available for the requested venue/symbol.
    Routing { detail: String },

    /// Socket or TLS failure during send or read. The session transitions
    /// to Faulted as a side effect of this error being raised.
    Transport { session_id: String, detail: String },

    /// Inbound bytes violate FIX framing, checksum, or sequence-number
    /// contracts. The session is Faulted; no local state is synthesized.
    Protocol { detail: String },

    /// Venue-originated rejection: `35=3`, `35=9`, or `35=8` with `39=8`.
    VenueReject { reason_code: Option<i32>, text: String },

    /// Pool or buffer exhaustion. Visible only via metrics in normal
    /// operation; this variant exists for code paths that must still
    /// report it (e.g. hard failure to grow past an absolute ceiling).
    Resource { detail: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Validation { field, reason } => {
                write!(f, "validation failed for '{field}': {reason}")
            }
            EngineError::Routing { detail } => write!(f, "routing failed: {detail}"),
            EngineError::Transport { session_id, detail } => {
                write!(f, "transport error on session {session_id}: {detail}")
            }
            EngineError::Protocol { detail } => write!(f, "protocol violation: {detail}"),
            EngineError::VenueReject { reason_code, text } => match reason_code {
                Some(code) => write!(f, "venue rejected ({code}): {text}"),
                None => write!(f, "venue rejected: {text}"),
            },
            EngineError::Resource { detail } => write!(f, "resource exhausted: {detail}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn routing(detail: impl Into<String>) -> Self {
        EngineError::Routing {
            detail: detail.into(),
        }
    }

    pub fn transport(session_id: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::Transport {
            session_id: session_id.into(),
            detail: detail.into(),
        }
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        EngineError::Protocol {
            detail: detail.into(),
        }
    }

    /// Stable code for metrics/logging correlation, independent of the
    /// human-readable message text.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation",
            EngineError::Routing { .. } => "routing",
            EngineError::Transport { .. } => "transport",
            EngineError::Protocol { .. } => "protocol",
            EngineError::VenueReject { .. } => "venue_reject",
            EngineError::Resource { .. } => "resource",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_field_context() {
        let err = EngineError::validation("quantity", "must be positive");
        assert_eq!(err.to_string(), "validation failed for 'quantity': must be positive");
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn venue_reject_without_code_omits_parens() {
        let err = EngineError::VenueReject {
            reason_code: None,
            text: "too late to cancel".to_string(),
        };
        assert_eq!(err.to_string(), "venue rejected: too late to cancel");
    }
}
