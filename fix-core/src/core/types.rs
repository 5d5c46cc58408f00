//! Discriminated FIX enumerations.
//!
//! The wire protocol dispatches on short ASCII codes (tag 35, tag 39, tag
//! 150, ...). Each of these gets a real Rust enum plus a fallback variant
//! so unrecognized codes survive pass-through logging instead of being
//! dropped.

use std::fmt;

/// Message type (tag 35). Only the subset the engine emits or consumes is
/// named explicitly; everything else round-trips through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MsgType {
    Logon,
    Heartbeat,
    TestRequest,
    ResendRequest,
    Reject,
    SequenceReset,
    Logout,
    NewOrderSingle,
    OrderCancelRequest,
    OrderCancelReplaceRequest,
    ExecutionReport,
    OrderCancelReject,
    MarketDataRequest,
    MarketDataSnapshotFullRefresh,
    MarketDataIncrementalRefresh,
    OrderMassCancelRequest,
    Other(String),
}

impl MsgType {
    pub fn fix_code(&self) -> &str {
        match self {
            MsgType::Logon => "A",
            MsgType::Heartbeat => "0",
            MsgType::TestRequest => "1",
            MsgType::ResendRequest => "2",
            MsgType::Reject => "3",
            MsgType::SequenceReset => "4",
            MsgType::Logout => "5",
            MsgType::NewOrderSingle => "D",
            MsgType::OrderCancelRequest => "F",
            MsgType::OrderCancelReplaceRequest => "G",
            MsgType::ExecutionReport => "8",
            MsgType::OrderCancelReject => "9",
            MsgType::MarketDataRequest => "V",
            MsgType::MarketDataSnapshotFullRefresh => "W",
            MsgType::MarketDataIncrementalRefresh => "X",
            MsgType::OrderMassCancelRequest => "q",
            MsgType::Other(code) => code,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "A" => MsgType::Logon,
            "0" => MsgType::Heartbeat,
            "1" => MsgType::TestRequest,
            "2" => MsgType::ResendRequest,
            "3" => MsgType::Reject,
            "4" => MsgType::SequenceReset,
            "5" => MsgType::Logout,
            "D" => MsgType::NewOrderSingle,
            "F" => MsgType::OrderCancelRequest,
            "G" => MsgType::OrderCancelReplaceRequest,
            "8" => MsgType::ExecutionReport,
            "9" => MsgType::OrderCancelReject,
            "V" => MsgType::MarketDataRequest,
            "W" => MsgType::MarketDataSnapshotFullRefresh,
            "X" => MsgType::MarketDataIncrementalRefresh,
            "q" => MsgType::OrderMassCancelRequest,
            other => MsgType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fix_code())
    }
}

/// Side (tag 54).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn fix_code(&self) -> &'static str {
        match self {
            Side::Buy => "1",
            Side::Sell => "2",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(Side::Buy),
            "2" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Order type (tag 40).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    pub fn fix_code(&self) -> &'static str {
        match self {
            OrderType::Market => "1",
            OrderType::Limit => "2",
            OrderType::Stop => "3",
            OrderType::StopLimit => "4",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(OrderType::Market),
            "2" => Some(OrderType::Limit),
            "3" => Some(OrderType::Stop),
            "4" => Some(OrderType::StopLimit),
            _ => None,
        }
    }
}

/// Time in force (tag 59).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeInForce {
    Day,
    GTC,
    OPG,
    IOC,
    FOK,
    GTD,
}

impl TimeInForce {
    pub fn fix_code(&self) -> &'static str {
        match self {
            TimeInForce::Day => "0",
            TimeInForce::GTC => "1",
            TimeInForce::OPG => "2",
            TimeInForce::IOC => "3",
            TimeInForce::FOK => "4",
            TimeInForce::GTD => "6",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(TimeInForce::Day),
            "1" => Some(TimeInForce::GTC),
            "2" => Some(TimeInForce::OPG),
            "3" => Some(TimeInForce::IOC),
            "4" => Some(TimeInForce::FOK),
            "6" => Some(TimeInForce::GTD),
            _ => None,
        }
    }
}

/// Order status as seen by the venue (tag 39). Carries the subset named in
/// the execution-report processing table; anything else lands in
/// `Unknown` and is observability-only (never mutates order state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrdStatus {
    PendingNew,
    New,
    PartiallyFilled,
    Filled,
    PendingCancel,
    Canceled,
    PendingReplace,
    Replaced,
    Rejected,
    Expired,
    Unknown,
}

impl OrdStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "A" => OrdStatus::PendingNew,
            "0" => OrdStatus::New,
            "1" => OrdStatus::PartiallyFilled,
            "2" => OrdStatus::Filled,
            "6" => OrdStatus::PendingCancel,
            "4" => OrdStatus::Canceled,
            "E" => OrdStatus::PendingReplace,
            "5" => OrdStatus::Replaced,
            "8" => OrdStatus::Rejected,
            "C" => OrdStatus::Expired,
            _ => OrdStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrdStatus::Filled | OrdStatus::Canceled | OrdStatus::Rejected | OrdStatus::Expired
        )
    }
}

/// Category of an execution record (`Execution record (E)` in the data
/// model), derived from the raw tag-150 exec-type character plus the
/// remaining leaves-quantity after applying a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecType {
    New,
    PartialFill,
    Fill,
    Canceled,
    Rejected,
    Replaced,
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_round_trips_known_codes() {
        for (code, expected) in [("A", MsgType::Logon), ("D", MsgType::NewOrderSingle)] {
            assert_eq!(MsgType::from_code(code), expected);
            assert_eq!(expected.fix_code(), code);
        }
    }

    #[test]
    fn unknown_msg_type_survives_as_other() {
        let parsed = MsgType::from_code("Z9");
        assert_eq!(parsed, MsgType::Other("Z9".to_string()));
        assert_eq!(parsed.fix_code(), "Z9");
    }

    #[test]
    fn ord_status_unknown_never_terminal() {
        assert!(!OrdStatus::from_code("nonsense").is_terminal());
        assert!(OrdStatus::from_code("2").is_terminal());
    }
}
