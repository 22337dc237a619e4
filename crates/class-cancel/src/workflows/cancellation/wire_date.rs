//! Codec for the `/Date(<epoch-ms>)/` envelope used by the workflow backend.
//!
//! OData may append a `+hhmm`/`-hhmm` offset after the milliseconds. The
//! milliseconds are already UTC, so the offset is checked and ignored.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serializer;
use tracing::warn;

const PREFIX: &str = "/Date(";
const SUFFIX: &str = ")/";

/// Raised when a wire date does not match the envelope or is out of range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireDateError {
    #[error("'{0}' is not a /Date(<epoch-ms>)/ value")]
    Malformed(String),
    #[error("epoch milliseconds {0} are outside the supported range")]
    OutOfRange(i64),
}

pub fn parse(raw: &str) -> Result<DateTime<Utc>, WireDateError> {
    let millis = raw
        .trim()
        .strip_prefix(PREFIX)
        .and_then(|rest| rest.strip_suffix(SUFFIX))
        .map(strip_offset)
        .filter(|digits| !digits.is_empty() && !digits.starts_with('+'))
        .and_then(|digits| digits.parse::<i64>().ok())
        .ok_or_else(|| WireDateError::Malformed(raw.to_string()))?;

    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(WireDateError::OutOfRange(millis))
}

/// Reads a date column leniently. Blank text is absent; a value that does not
/// parse is logged and also read as absent.
pub fn parse_column(column: &str, raw: &str) -> Option<DateTime<Utc>> {
    if raw.trim().is_empty() {
        return None;
    }
    match parse(raw) {
        Ok(instant) => Some(instant),
        Err(err) => {
            warn!(column, error = %err, "ignoring unreadable date column");
            None
        }
    }
}

fn strip_offset(body: &str) -> &str {
    // Skip index 0 so a leading minus stays part of pre-epoch millis.
    match body.get(1..).and_then(|rest| rest.rfind(|c| c == '+' || c == '-')) {
        Some(index) => {
            let split = index + 1;
            let offset = &body[split + 1..];
            if offset.len() == 4 && offset.bytes().all(|byte| byte.is_ascii_digit()) {
                &body[..split]
            } else {
                body
            }
        }
        None => body,
    }
}

pub fn format(instant: DateTime<Utc>) -> String {
    format!("{PREFIX}{}{SUFFIX}", instant.timestamp_millis())
}

/// Serializer for nullable wire dates; `None` is written as `null`.
pub mod option {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(instant) => serializer.serialize_str(&super::format(*instant)),
            None => serializer.serialize_none(),
        }
    }
}
