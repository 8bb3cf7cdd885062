//! Normalised service-performance records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Crs, DayType, Hhmm, delay_minutes};

/// Parse the service date embedded in a Darwin RID.
///
/// RIDs are `YYYYMMDD` followed by a numeric suffix, e.g.
/// `201607013361753` ran on 2016-07-01.
pub fn rid_service_date(rid: &str) -> Option<NaiveDate> {
    if rid.len() < 9 || !rid.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(&rid[..8], "%Y%m%d").ok()
}

/// One run of a train between a route's origin and destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Darwin RID, unique per run of a train.
    pub rid: String,
    /// Name of the configured route this record was collected for.
    pub route: String,
    pub date_of_service: NaiveDate,
    pub day_type: DayType,
    pub toc_code: Option<String>,
    pub origin: Crs,
    pub destination: Crs,
    pub scheduled_departure: Option<Hhmm>,
    pub scheduled_arrival: Option<Hhmm>,
    pub actual_departure: Option<Hhmm>,
    pub actual_arrival: Option<Hhmm>,
    pub cancel_reason: Option<String>,
}

impl ServiceRecord {
    /// Minutes late at the destination, if both times are known.
    pub fn arrival_delay(&self) -> Option<i32> {
        Some(delay_minutes(self.scheduled_arrival?, self.actual_arrival?))
    }

    /// Minutes late leaving the origin, if both times are known.
    pub fn departure_delay(&self) -> Option<i32> {
        Some(delay_minutes(
            self.scheduled_departure?,
            self.actual_departure?,
        ))
    }
}
