//! Wire Codec (C2): parse inbound bytes into an [`Envelope`], serialize an
//! envelope's fields back to bytes, and validate message-type-specific
//! required fields.
//!
//! Grounded on the classic tag=value/SOH walk (see any FIX engine's
//! message reader): scan forward recording field boundaries, verify
//! `BeginString`/`BodyLength`/`MsgType` occupy the first three field
//! slots, and check the trailing checksum against a running byte sum.
//! The one departure from a naive reader is that field values are never
//! copied out individually — `parse` makes a single bulk copy of the
//! message into a pooled buffer and every field after that is an
//! offset/length pair into it.

use crate::core::clock::{format_fix_timestamp_millis, parse_fix_timestamp};
use crate::core::errors::EngineError;
use crate::core::types::MsgType;
use crate::message::Envelope;
use crate::pool::MessagePool;

pub const SOH: u8 = 0x01;
const BEGIN_STRING_FIELD: &[u8] = b"8=FIX.4.4\x01";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not enough bytes for a full message; caller retains the buffer and
    /// tries again once more bytes arrive. `consumed` is always 0.
    NeedMore,
    BadChecksum,
    MalformedHeader(String),
    BadLength,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    DelimiterInValue(u16),
    TagOutOfRange(u32),
}

/// Fields promoted onto every outbound message by the builder; per-message
/// fields (tag 11, 55, 54, ...) are supplied separately.
#[derive(Debug, Clone)]
pub struct Header {
    pub sender_comp_id: String,
    pub target_comp_id: String,
    pub msg_seq_num: u32,
    pub sending_time_micros: i64,
}

/// Scan `buf` for one complete FIX message, copy it into a pooled
/// envelope, and record each field as an offset/length pair.
///
/// Returns `(envelope, bytes_consumed)`. On `ParseError::NeedMore`, no
/// bytes were consumed and the caller should retry once more data has
/// arrived; every other error is fatal to the session per C3's contract.
pub fn parse(buf: &[u8], pool: &MessagePool, hardware_timestamp_nanos: u64) -> Result<(Envelope, usize), ParseError> {
    if buf.len() < BEGIN_STRING_FIELD.len() || &buf[..BEGIN_STRING_FIELD.len()] != BEGIN_STRING_FIELD {
        if buf.len() < BEGIN_STRING_FIELD.len() {
            return Err(ParseError::NeedMore);
        }
        return Err(ParseError::MalformedHeader("missing or wrong BeginString".into()));
    }

    let mut pos = BEGIN_STRING_FIELD.len();
    if buf.len() < pos + 2 || &buf[pos..pos + 2] != b"9=" {
        return Err(ParseError::MalformedHeader("missing BodyLength tag".into()));
    }
    pos += 2;
    let body_len_start = pos;
    let body_len_soh = match buf[pos..].iter().position(|&b| b == SOH) {
        Some(i) => pos + i,
        None => return Err(ParseError::NeedMore),
    };
    let body_len: usize = std::str::from_utf8(&buf[body_len_start..body_len_soh])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::MalformedHeader("BodyLength not decodable".into()))?;

    let body_start = body_len_soh + 1;
    let body_end = body_start + body_len;
    // Need at least the checksum tag's bytes beyond the body.
    if buf.len() < body_end + 7 {
        return Err(ParseError::NeedMore);
    }
    if &buf[body_end..body_end + 3] != b"10=" {
        return Err(ParseError::BadLength);
    }
    if buf[body_end + 6] != SOH {
        return Err(ParseError::MalformedHeader("checksum field not SOH-terminated".into()));
    }
    let expected_checksum: u32 = std::str::from_utf8(&buf[body_end + 3..body_end + 6])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::MalformedHeader("checksum not decodable".into()))?;

    let computed_checksum = calculate_checksum(&buf[..body_end]);
    if computed_checksum != expected_checksum {
        return Err(ParseError::BadChecksum);
    }

    let total_len = body_end + 7;
    let mut env = pool.acquire_with_buffer(total_len);
    {
        let dst = env.buffer.get_or_insert_with(Vec::new);
        dst.clear();
        dst.extend_from_slice(&buf[..total_len]);
    }
    env.hardware_timestamp_nanos = hardware_timestamp_nanos;

    let data = &buf[..total_len];
    let mut idx = 0usize;
    let mut field_no = 0usize;

    while idx < body_end {
        let eq_idx = match data[idx..body_end].iter().position(|&b| b == b'=') {
            Some(i) => idx + i,
            None => return Err(ParseError::MalformedHeader("field missing '='".into())),
        };
        let tag: u16 = std::str::from_utf8(&data[idx..eq_idx])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ParseError::MalformedHeader("non-numeric tag".into()))?;

        let val_start = eq_idx + 1;
        let soh_rel = match data[val_start..body_end].iter().position(|&b| b == SOH) {
            Some(i) => val_start + i,
            None => return Err(ParseError::MalformedHeader("field missing SOH".into())),
        };
        let val_len = soh_rel - val_start;

        field_no += 1;
        match field_no {
            1 if tag != 8 => return Err(ParseError::MalformedHeader("first field must be tag 8".into())),
            2 if tag != 9 => return Err(ParseError::MalformedHeader("second field must be tag 9".into())),
            3 if tag != 35 => return Err(ParseError::MalformedHeader("third field must be tag 35".into())),
            _ => {}
        }

        env.fields.push_borrowed(tag, val_start as u32, val_len as u32);

        let value = std::str::from_utf8(&data[val_start..soh_rel]).unwrap_or("");
        match tag {
            35 => env.msg_type = MsgType::from_code(value),
            49 => env.sender_comp_id = value.to_string(),
            56 => env.target_comp_id = value.to_string(),
            34 => env.seq_num = value.parse().unwrap_or(0),
            52 => env.sending_time_micros = parse_fix_timestamp(value).unwrap_or(0),
            _ => {}
        }

        idx = soh_rel + 1;
    }

    if field_no < 3 {
        return Err(ParseError::MalformedHeader("message ended before MsgType field".into()));
    }
    if env.sender_comp_id.is_empty() || env.target_comp_id.is_empty() {
        return Err(ParseError::MalformedHeader("missing SenderCompID/TargetCompID".into()));
    }

    Ok((env, total_len))
}

/// `(sum of all bytes up to the checksum field) mod 256`.
pub fn calculate_checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| acc + b as u32) % 256
}

/// Serialize `msg_type` plus `header` and `fields` (in insertion order) to
/// `out`, computing `BodyLength` and the trailing checksum. Returns the
/// number of bytes written.
pub fn build(
    msg_type: &MsgType,
    header: &Header,
    fields: &[(u16, String)],
    out: &mut Vec<u8>,
) -> Result<usize, BuildError> {
    for (tag, value) in fields {
        if *tag as u32 > 65_535 {
            return Err(BuildError::TagOutOfRange(*tag as u32));
        }
        if value.as_bytes().contains(&SOH) {
            return Err(BuildError::DelimiterInValue(*tag));
        }
    }

    let mut body = Vec::with_capacity(128);
    write_field(&mut body, 35, msg_type.fix_code());
    write_field(&mut body, 34, &header.msg_seq_num.to_string());
    write_field(&mut body, 49, &header.sender_comp_id);
    write_field(&mut body, 56, &header.target_comp_id);
    write_field(&mut body, 52, &format_fix_timestamp_millis(header.sending_time_micros));
    for (tag, value) in fields {
        write_field(&mut body, *tag, value);
    }

    out.clear();
    out.extend_from_slice(BEGIN_STRING_FIELD);
    out.extend_from_slice(format!("9={}\x01", body.len()).as_bytes());
    out.extend_from_slice(&body);

    let checksum = calculate_checksum(out);
    out.extend_from_slice(format!("10={:03}\x01", checksum).as_bytes());

    Ok(out.len())
}

fn write_field(buf: &mut Vec<u8>, tag: u16, value: &str) {
    buf.extend_from_slice(tag.to_string().as_bytes());
    buf.push(b'=');
    buf.extend_from_slice(value.as_bytes());
    buf.push(SOH);
}

/// Message-type-specific required fields (second-stage validation, after
/// a successful parse).
pub fn validate(env: &Envelope) -> Result<(), EngineError> {
    let required: &[u16] = match &env.msg_type {
        MsgType::NewOrderSingle => &[11, 21, 55, 54, 60, 40],
        MsgType::OrderCancelRequest => &[11, 41, 55, 54, 60],
        MsgType::OrderCancelReplaceRequest => &[11, 41, 55, 54, 60, 40, 38],
        MsgType::ExecutionReport => &[37, 17, 150, 39, 55, 54],
        _ => &[],
    };

    for &tag in required {
        if env.field(tag).is_none() {
            return Err(EngineError::protocol(format!(
                "missing required tag {tag} for {:?} message",
                env.msg_type
            )));
        }
    }
    Ok(())
}
