//! `HHMM` times as used on the HSP wire.
//!
//! HSP sends and accepts times of day as four digits without a separator
//! (`"0712"`), and uses an empty string when a location has no time.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error returned when parsing an invalid time string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time {input:?}: {reason}")]
pub struct TimeError {
    input: String,
    reason: &'static str,
}

/// A time of day with minute precision, written `HHMM`.
///
/// # Examples
///
/// ```
/// use hsp_collector::domain::Hhmm;
///
/// let t = Hhmm::parse("0712").unwrap();
/// assert_eq!(t.to_string(), "0712");
/// assert!(Hhmm::parse("07:12").is_err());
/// assert!(Hhmm::parse("2400").is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hhmm(u16);

impl Hhmm {
    /// 00:00.
    pub const MIDNIGHT: Hhmm = Hhmm(0);

    /// 23:59, the last minute HSP accepts in a time filter.
    pub const LAST_MINUTE: Hhmm = Hhmm(23 * 60 + 59);

    /// Parse a time from exactly four ASCII digits.
    pub fn parse(s: &str) -> Result<Self, TimeError> {
        let invalid = |reason| TimeError {
            input: s.to_string(),
            reason,
        };

        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err(invalid("expected HHMM format"));
        }

        let hour = parse_two_digits(&bytes[0..2]).ok_or_else(|| invalid("invalid hour digits"))?;
        if hour > 23 {
            return Err(invalid("hour must be 0-23"));
        }
        let minute =
            parse_two_digits(&bytes[2..4]).ok_or_else(|| invalid("invalid minute digits"))?;
        if minute > 59 {
            return Err(invalid("minute must be 0-59"));
        }

        Ok(Hhmm((hour * 60 + minute) as u16))
    }

    /// Parse an optional wire time, treating the empty string as absent.
    pub fn parse_optional(s: &str) -> Result<Option<Self>, TimeError> {
        let s = s.trim();
        if s.is_empty() {
            Ok(None)
        } else {
            Self::parse(s).map(Some)
        }
    }

    /// Create from hour and minute components.
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then(|| Hhmm((hour * 60 + minute) as u16))
    }

    /// Minutes since midnight.
    pub fn minutes(&self) -> u32 {
        u32::from(self.0)
    }
}

impl fmt::Debug for Hhmm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hhmm({self})")
    }
}

impl fmt::Display for Hhmm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for Hhmm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hhmm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hhmm::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse two ASCII digit bytes into a u32.
fn parse_two_digits(bytes: &[u8]) -> Option<u32> {
    if bytes.len() != 2 {
        return None;
    }
    let d1 = (bytes[0] as char).to_digit(10)?;
    let d2 = (bytes[1] as char).to_digit(10)?;
    Some(d1 * 10 + d2)
}

/// Signed difference `actual - scheduled` in minutes.
///
/// Times more than twelve hours apart are assumed to straddle midnight, so
/// a train booked for 23:58 that arrives at 00:03 is five minutes late.
pub fn delay_minutes(scheduled: Hhmm, actual: Hhmm) -> i32 {
    let diff = actual.minutes() as i32 - scheduled.minutes() as i32;
    match diff {
        d if d > 720 => d - 1440,
        d if d < -720 => d + 1440,
        d => d,
    }
}
