//! HSP request and response DTOs.
//!
//! These types map directly to the HSP JSON API. HSP encodes numbers as
//! strings and uses empty strings for missing times, so response fields are
//! kept as strings here and validated during conversion.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Crs, DayType, Hhmm};

/// Body of a `serviceMetrics` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceMetricsRequest {
    pub from_loc: Crs,
    pub to_loc: Crs,
    pub from_time: Hhmm,
    pub to_time: Hhmm,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub days: DayType,
    /// Lateness thresholds in minutes, e.g. `["2", "5", "10"]`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tolerance: Vec<String>,
}

/// Response from `serviceMetrics`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceMetricsResponse {
    pub header: Option<MetricsHeader>,

    /// Services matching the filter. Absent when nothing ran.
    #[serde(rename = "Services", default)]
    pub services: Vec<MetricsService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsHeader {
    pub from_location: Option<String>,
    pub to_location: Option<String>,
}

/// One timetabled service and the RIDs of each day it ran.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsService {
    #[serde(rename = "serviceAttributesMetrics")]
    pub attributes: ServiceAttributesMetrics,

    #[serde(rename = "Metrics", default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAttributesMetrics {
    pub origin_location: String,
    pub destination_location: String,
    /// Public departure time at the origin (`HHMM`).
    #[serde(default)]
    pub gbtt_ptd: String,
    /// Public arrival time at the destination (`HHMM`).
    #[serde(default)]
    pub gbtt_pta: String,
    pub toc_code: Option<String>,
    pub matched_services: Option<String>,
    #[serde(default)]
    pub rids: Vec<String>,
}

/// Punctuality against one tolerance threshold.
#[derive(Debug, Clone, Deserialize)]
pub struct Metric {
    pub tolerance_value: String,
    pub num_not_tolerance: String,
    pub num_tolerance: String,
    pub percent_tolerance: String,
    #[serde(default)]
    pub global_tolerance: bool,
}

/// Body of a `serviceDetails` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDetailsRequest {
    pub rid: String,
}

/// Response from `serviceDetails`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDetailsResponse {
    #[serde(rename = "serviceAttributesDetails")]
    pub details: ServiceAttributesDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAttributesDetails {
    pub date_of_service: String,
    pub toc_code: Option<String>,
    pub rid: String,
    #[serde(default)]
    pub locations: Vec<DetailLocation>,
}

/// Scheduled and actual times at one calling point.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailLocation {
    pub location: String,
    #[serde(default)]
    pub gbtt_ptd: String,
    #[serde(default)]
    pub gbtt_pta: String,
    #[serde(default)]
    pub actual_td: String,
    #[serde(default)]
    pub actual_ta: String,
    #[serde(default)]
    pub late_canc_reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_request_wire_format() {
        let req = ServiceMetricsRequest {
            from_loc: Crs::parse("BTN").unwrap(),
            to_loc: Crs::parse("VIC").unwrap(),
            from_time: Hhmm::parse("0700").unwrap(),
            to_time: Hhmm::parse("0800").unwrap(),
            from_date: NaiveDate::from_ymd_opt(2016, 7, 1).unwrap(),
            to_date: NaiveDate::from_ymd_opt(2016, 7, 7).unwrap(),
            days: DayType::Weekday,
            tolerance: vec!["2".into(), "5".into()],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "from_loc": "BTN",
                "to_loc": "VIC",
                "from_time": "0700",
                "to_time": "0800",
                "from_date": "2016-07-01",
                "to_date": "2016-07-07",
                "days": "WEEKDAY",
                "tolerance": ["2", "5"],
            })
        );
    }

    #[test]
    fn parses_metrics_response() {
        let body = r#"{
            "header": {"from_location": "BTN", "to_location": "VIC"},
            "Services": [{
                "serviceAttributesMetrics": {
                    "origin_location": "BTN",
                    "destination_location": "VIC",
                    "gbtt_ptd": "0712",
                    "gbtt_pta": "0823",
                    "toc_code": "GX",
                    "matched_services": "2",
                    "rids": ["201607013361753", "201607043392116"]
                },
                "Metrics": [{
                    "tolerance_value": "0",
                    "num_not_tolerance": "1",
                    "num_tolerance": "1",
                    "percent_tolerance": "50",
                    "global_tolerance": true
                }]
            }]
        }"#;
        let resp: ServiceMetricsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.services.len(), 1);
        assert_eq!(resp.services[0].attributes.rids.len(), 2);
        assert_eq!(resp.services[0].metrics[0].percent_tolerance, "50");
    }

    #[test]
    fn missing_services_is_empty() {
        let resp: ServiceMetricsResponse = serde_json::from_str(r#"{"header": {}}"#).unwrap();
        assert!(resp.services.is_empty());
    }

    #[test]
    fn parses_details_response() {
        let body = r#"{"serviceAttributesDetails": {
            "date_of_service": "2016-07-01",
            "toc_code": "GX",
            "rid": "201607013361753",
            "locations": [
                {"location": "BTN", "gbtt_ptd": "0712", "gbtt_pta": "",
                 "actual_td": "0711", "actual_ta": "", "late_canc_reason": ""},
                {"location": "VIC", "gbtt_ptd": "", "gbtt_pta": "0823",
                 "actual_td": "", "actual_ta": "0827", "late_canc_reason": "104"}
            ]
        }}"#;
        let resp: ServiceDetailsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.details.locations.len(), 2);
        assert_eq!(resp.details.locations[1].actual_ta, "0827");
    }
}
