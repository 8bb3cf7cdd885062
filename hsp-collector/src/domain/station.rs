//! Station code types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error returned when parsing an invalid CRS code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid CRS code {input:?}: {reason}")]
pub struct InvalidCrs {
    input: String,
    reason: &'static str,
}

/// A valid 3-letter CRS (Computer Reservation System) station code.
///
/// HSP accepts and returns CRS codes as 3 uppercase ASCII letters. Route
/// configuration is commonly written in lowercase, so [`Crs::parse_lenient`]
/// upper-cases before validating; [`Crs::parse`] is strict.
///
/// # Examples
///
/// ```
/// use hsp_collector::domain::Crs;
///
/// let btn = Crs::parse("BTN").unwrap();
/// assert_eq!(btn.as_str(), "BTN");
///
/// assert!(Crs::parse("btn").is_err());
/// assert_eq!(Crs::parse_lenient(" vic ").unwrap().as_str(), "VIC");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Crs([u8; 3]);

impl Crs {
    /// Parse a CRS code, requiring exactly 3 uppercase ASCII letters.
    pub fn parse(s: &str) -> Result<Self, InvalidCrs> {
        let invalid = |reason| InvalidCrs {
            input: s.to_string(),
            reason,
        };

        let bytes = s.as_bytes();
        if bytes.len() != 3 {
            return Err(invalid("must be exactly 3 characters"));
        }
        if !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(invalid("must be uppercase ASCII letters A-Z"));
        }

        Ok(Crs([bytes[0], bytes[1], bytes[2]]))
    }

    /// Parse a CRS code after trimming whitespace and upper-casing.
    pub fn parse_lenient(s: &str) -> Result<Self, InvalidCrs> {
        Self::parse(&s.trim().to_ascii_uppercase())
    }

    /// Returns the CRS code as a string slice.
    pub fn as_str(&self) -> &str {
        // Only ASCII uppercase letters are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for Crs {
    type Err = InvalidCrs;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s)
    }
}

impl fmt::Debug for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crs({})", self.as_str())
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Crs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Crs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Crs::parse_lenient(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_crs() {
        assert!(Crs::parse("BTN").is_ok());
        assert!(Crs::parse("VIC").is_ok());
        assert!(Crs::parse("ZZZ").is_ok());
    }

    #[test]
    fn strict_parse_rejects_lowercase_and_bad_length() {
        assert!(Crs::parse("btn").is_err());
        assert!(Crs::parse("BT").is_err());
        assert!(Crs::parse("BTNX").is_err());
        assert!(Crs::parse("B1N").is_err());
    }

    #[test]
    fn lenient_parse_normalises() {
        assert_eq!(Crs::parse_lenient("btn").unwrap(), Crs::parse("BTN").unwrap());
        assert_eq!(Crs::parse_lenient("  Vic").unwrap().as_str(), "VIC");
        assert!(Crs::parse_lenient("v1c").is_err());
    }

    #[test]
    fn error_mentions_input() {
        let err = Crs::parse("KINGS").unwrap_err();
        assert!(err.to_string().contains("KINGS"));
    }

    #[test]
    fn serde_uses_plain_string() {
        let crs = Crs::parse("PAD").unwrap();
        assert_eq!(serde_json::to_string(&crs).unwrap(), "\"PAD\"");

        let back: Crs = serde_json::from_str("\"pad\"").unwrap();
        assert_eq!(back, crs);

        assert!(serde_json::from_str::<Crs>("\"PADD\"").is_err());
    }
}
