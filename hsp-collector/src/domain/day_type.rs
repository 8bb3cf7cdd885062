//! Service-calendar day types.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Error returned for an unrecognised day-type filter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DayTypeError {
    #[error("unknown day type {0:?} (expected WEEKDAY, SATURDAY, SUNDAY or WEEKEND)")]
    Unknown(String),

    #[error("day type filter is empty")]
    Empty,
}

/// The HSP `days` filter.
///
/// HSP only knows three calendars; `WEEKEND` is a configuration shorthand
/// expanded by [`parse_day_types`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayType {
    Weekday,
    Saturday,
    Sunday,
}

impl DayType {
    /// The value HSP expects in the `days` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            DayType::Weekday => "WEEKDAY",
            DayType::Saturday => "SATURDAY",
            DayType::Sunday => "SUNDAY",
        }
    }

    /// The calendar a given date runs on.
    pub fn of_date(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Sat => DayType::Saturday,
            Weekday::Sun => DayType::Sunday,
            _ => DayType::Weekday,
        }
    }

    /// Whether `date` runs on this calendar.
    pub fn matches(&self, date: NaiveDate) -> bool {
        Self::of_date(date) == *self
    }
}

impl fmt::Display for DayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayType {
    type Err = DayTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WEEKDAY" => Ok(DayType::Weekday),
            "SATURDAY" => Ok(DayType::Saturday),
            "SUNDAY" => Ok(DayType::Sunday),
            _ => Err(DayTypeError::Unknown(s.trim().to_string())),
        }
    }
}

/// Expand a comma-separated day-type filter.
///
/// `WEEKEND` becomes `SATURDAY, SUNDAY`. The result keeps first-seen order
/// and contains no duplicates.
///
/// ```
/// use hsp_collector::domain::{DayType, parse_day_types};
///
/// let days = parse_day_types("sunday, WEEKEND, weekday").unwrap();
/// assert_eq!(days, vec![DayType::Sunday, DayType::Saturday, DayType::Weekday]);
/// ```
pub fn parse_day_types(config: &str) -> Result<Vec<DayType>, DayTypeError> {
    let mut days = Vec::new();
    let mut push = |day: DayType| {
        if !days.contains(&day) {
            days.push(day);
        }
    };

    for token in config.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if token.eq_ignore_ascii_case("WEEKEND") {
            push(DayType::Saturday);
            push(DayType::Sunday);
        } else {
            push(token.parse()?);
        }
    }

    if days.is_empty() {
        return Err(DayTypeError::Empty);
    }
    Ok(days)
}
