//! Utilities shared by the jmsbus crates
//!
//! ## Core Features:
//! - **In-flight Counting**: [`WaitCounter`], a counter that callers can block on until it drains to zero
//! - **Duration Parsing**: Strict parsing of configured intervals such as `20s` or `1m30s`
//! - **Message Times**: Millisecond timestamps and expirations for message headers
//!
//! ## Usage Examples:
//! ```rust
//! use jmsbus_utils::{parse_duration, WaitCounter};
//!
//! let interval = parse_duration("1m30s").unwrap();
//! assert_eq!(interval.as_secs(), 90);
//!
//! let inflight = WaitCounter::new();
//! inflight.inc();
//! inflight.dec();
//! inflight.wait_zero(interval);
//! ```

#![deny(unsafe_code)]

use std::time::Duration;

use serde::{de, de::Deserializer, Deserialize};

mod counter;

pub use counter::WaitCounter;

/// Milliseconds since the Unix epoch, as carried in message headers.
pub type TimestampMillis = i64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration `{0}`, expected segments such as 500ms, 20s, 1m, 2h or 1d")]
    Invalid(String),
    #[error("duration `{0}` is too large")]
    Overflow(String),
}

/// Deserializes a duration written the way [`parse_duration`] accepts it.
#[inline]
pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let v = String::deserialize(deserializer)?;
    parse_duration(&v).map_err(de::Error::custom)
}

/// Parses a sequence of `<number><unit>` segments, units being `ms`, `s`,
/// `m`, `h` and `d`. Every segment must carry a unit.
///
/// ```
/// let d = jmsbus_utils::parse_duration("1h30m15s").unwrap();
/// assert_eq!(d.as_secs(), 5415);
/// assert!(jmsbus_utils::parse_duration("15").is_err());
/// ```
pub fn parse_duration(text: &str) -> Result<Duration, DurationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DurationError::Empty);
    }
    let invalid = || DurationError::Invalid(text.to_owned());

    let mut ms: u64 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let factor = match &rest[..unit_len] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        ms = value
            .checked_mul(factor)
            .and_then(|v| ms.checked_add(v))
            .ok_or_else(|| DurationError::Overflow(text.to_owned()))?;
    }
    Ok(Duration::from_millis(ms))
}

#[inline]
pub fn timestamp_millis() -> TimestampMillis {
    chrono::Utc::now().timestamp_millis()
}

/// Expiration header for a message sent at `sent_at` with `time_to_live`;
/// zero, meaning never, when the time to live is not positive.
#[inline]
pub fn expiration(sent_at: TimestampMillis, time_to_live: i64) -> TimestampMillis {
    if time_to_live > 0 {
        sent_at.saturating_add(time_to_live)
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("20s"), Ok(Duration::from_secs(20)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration(" 500ms "), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1d1ms"), Ok(Duration::from_millis(86_400_001)));
        assert_eq!(parse_duration("0s"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_parse_duration_rejects() {
        assert_eq!(parse_duration(""), Err(DurationError::Empty));
        assert!(matches!(parse_duration("bogus"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("15"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("10x"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("s10"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("99999999999999999999d"), Err(DurationError::Invalid(_))));
        assert!(matches!(parse_duration("999999999999999d"), Err(DurationError::Overflow(_))));
    }

    #[test]
    fn test_expiration() {
        assert_eq!(expiration(1_000, 0), 0);
        assert_eq!(expiration(1_000, -5), 0);
        assert_eq!(expiration(1_000, 250), 1_250);
        assert_eq!(expiration(i64::MAX - 1, 10), i64::MAX);
        assert!(timestamp_millis() > 0);
    }
}
