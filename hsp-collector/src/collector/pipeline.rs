//! Turning upstream responses into validated records.

use std::future::Future;

use tracing::{debug, warn};

use crate::domain::{ServiceRecord, Task, rid_service_date};
use crate::hsp::{
    HspClient, HspError, ServiceMetricsResponse, Transport, apply_details, records_from_metrics,
};

/// What a processor may use besides the raw response.
pub struct ProcessContext<'a, T> {
    pub task: &'a Task,
    /// Client for follow-up requests; shares the run's rate limiter.
    pub client: &'a HspClient<T>,
}

/// Converts a `serviceMetrics` response into records for one task.
pub trait Processor {
    fn transform<T: Transport>(
        &self,
        raw: &ServiceMetricsResponse,
        ctx: ProcessContext<'_, T>,
    ) -> impl Future<Output = Result<Vec<ServiceRecord>, HspError>>;
}

/// Checks a record before it is saved.
pub trait Validator {
    /// Returns whether the record may be saved, and every problem found.
    fn validate(&self, record: &ServiceRecord, task: &Task) -> (bool, Vec<String>);
}

/// The standard HSP processor.
///
/// Expands every metrics service into one record per RID. With
/// `fetch_details` set, each record is enriched from `serviceDetails`; a
/// detail request that fails for any reason other than authentication leaves
/// the metrics-only record in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct HspProcessor {
    pub fetch_details: bool,
}

impl HspProcessor {
    pub fn new(fetch_details: bool) -> Self {
        Self { fetch_details }
    }
}

impl Processor for HspProcessor {
    async fn transform<T: Transport>(
        &self,
        raw: &ServiceMetricsResponse,
        ctx: ProcessContext<'_, T>,
    ) -> Result<Vec<ServiceRecord>, HspError> {
        let route = &ctx.task.route.name;
        let mut records = Vec::new();
        for service in &raw.services {
            match records_from_metrics(service, route) {
                Ok(mut batch) => records.append(&mut batch),
                Err(e) => warn!(
                    route = %route,
                    origin = %service.attributes.origin_location,
                    error = %e,
                    "skipping unparsable service"
                ),
            }
        }

        if !self.fetch_details {
            return Ok(records);
        }

        for record in &mut records {
            let details = match ctx.client.service_details(&record.rid).await {
                Ok(response) => response.details,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(rid = %record.rid, error = %e, "service details unavailable");
                    continue;
                }
            };

            let mut detailed = record.clone();
            match apply_details(&mut detailed, &details) {
                Ok(()) => *record = detailed,
                Err(e) => warn!(rid = %record.rid, error = %e, "ignoring malformed service details"),
            }
        }
        debug!(route = %route, records = records.len(), "details applied");

        Ok(records)
    }
}

/// Structural checks against the task a record was fetched for.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValidator;

impl Validator for RecordValidator {
    fn validate(&self, record: &ServiceRecord, task: &Task) -> (bool, Vec<String>) {
        let mut issues = Vec::new();

        match rid_service_date(&record.rid) {
            None => issues.push(format!("malformed RID {:?}", record.rid)),
            Some(date) if date != record.date_of_service => issues.push(format!(
                "RID {} does not match date of service {}",
                record.rid, record.date_of_service
            )),
            Some(_) => {}
        }

        if !task.window.contains(record.date_of_service) {
            issues.push(format!(
                "date of service {} outside {}",
                record.date_of_service, task.window
            ));
        }
        if record.day_type != task.day_type {
            issues.push(format!(
                "runs on {} but {} was requested",
                record.day_type, task.day_type
            ));
        }
        if record.route != task.route.name {
            issues.push(format!("belongs to route {:?}", record.route));
        }
        if record.origin != task.route.origin {
            issues.push(format!(
                "origin {} is not {}",
                record.origin, task.route.origin
            ));
        }
        if record.destination != task.route.destination {
            issues.push(format!(
                "destination {} is not {}",
                record.destination, task.route.destination
            ));
        }

        (issues.is_empty(), issues)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{Crs, DayType, Hhmm, Route};
    use crate::hsp::testing::{ScriptedTransport, fast_config, reply};
    use crate::store::testing::{record, week};

    fn task(day_type: DayType) -> Task {
        let route = Route::new("am", Crs::parse("BTN").unwrap(), Crs::parse("VIC").unwrap());
        Task::new(Arc::new(route), week((2024, 1, 8)), day_type)
    }

    const METRICS: &str = r#"{
        "Services": [{
            "serviceAttributesMetrics": {
                "origin_location": "BTN", "destination_location": "VIC",
                "gbtt_ptd": "0712", "gbtt_pta": "0823", "toc_code": "GX",
                "matched_services": "2",
                "rids": ["202401083361753", "202401093361753"]
            },
            "Metrics": []
        }, {
            "serviceAttributesMetrics": {
                "origin_location": "B?N", "destination_location": "VIC",
                "gbtt_ptd": "0742", "gbtt_pta": "0853", "toc_code": "GX",
                "matched_services": "1", "rids": ["202401083361800"]
            },
            "Metrics": []
        }]
    }"#;

    const DETAILS: &str = r#"{"serviceAttributesDetails": {
        "date_of_service": "2024-01-08", "toc_code": "GX", "rid": "202401083361753",
        "locations": [
            {"location": "BTN", "gbtt_ptd": "0712", "actual_td": "0714"},
            {"location": "VIC", "gbtt_pta": "0823", "actual_ta": "0831",
             "late_canc_reason": "Signal failure"}
        ]}}"#;

    fn raw() -> ServiceMetricsResponse {
        serde_json::from_str(METRICS).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_only_expands_rids() {
        let client = HspClient::with_transport(ScriptedTransport::new([]), &fast_config(1));
        let t = task(DayType::Weekday);
        let records = HspProcessor::new(false)
            .transform(&raw(), ProcessContext { task: &t, client: &client })
            .await
            .unwrap();

        // The service with a bad CRS is dropped.
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.actual_arrival.is_none()));
        assert_eq!(client.transport().request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn details_fill_actual_times() {
        let transport = ScriptedTransport::new([reply(200, DETAILS), reply(404, "not found")]);
        let client = HspClient::with_transport(transport, &fast_config(1));
        let t = task(DayType::Weekday);
        let records = HspProcessor::new(true)
            .transform(&raw(), ProcessContext { task: &t, client: &client })
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].actual_departure, Hhmm::from_hm(7, 14));
        assert_eq!(records[0].arrival_delay(), Some(8));
        assert_eq!(records[0].cancel_reason.as_deref(), Some("Signal failure"));
        // The failed lookup degrades to the metrics-only record.
        assert_eq!(records[1].rid, "202401093361753");
        assert_eq!(records[1].actual_arrival, None);
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_failure_in_details_propagates() {
        let transport = ScriptedTransport::new([reply(401, "")]);
        let client = HspClient::with_transport(transport, &fast_config(3));
        let t = task(DayType::Weekday);
        let err = HspProcessor::new(true)
            .transform(&raw(), ProcessContext { task: &t, client: &client })
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn valid_record_passes() {
        let (ok, issues) =
            RecordValidator.validate(&record("am", "202401083361753"), &task(DayType::Weekday));
        assert!(ok, "{issues:?}");
        assert!(issues.is_empty());
    }

    #[test]
    fn record_outside_window_fails() {
        let (ok, issues) =
            RecordValidator.validate(&record("am", "202401163361753"), &task(DayType::Weekday));
        assert!(!ok);
        assert!(issues.iter().any(|i| i.contains("outside")));
    }

    #[test]
    fn wrong_day_type_and_route_fail() {
        let (ok, issues) =
            RecordValidator.validate(&record("pm", "202401083361753"), &task(DayType::Sunday));
        assert!(!ok);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn mismatched_stations_and_rid_fail() {
        let mut r = record("am", "202401083361753");
        r.origin = Crs::parse("LBG").unwrap();
        r.rid = "2024010X".into();
        let (ok, issues) = RecordValidator.validate(&r, &task(DayType::Weekday));
        assert!(!ok);
        assert!(issues.iter().any(|i| i.contains("origin")));
        assert!(issues.iter().any(|i| i.contains("malformed RID")));
    }
}
