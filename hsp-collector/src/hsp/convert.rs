//! Conversion from HSP DTOs to service records.

use chrono::NaiveDate;

use crate::domain::{Crs, DayType, Hhmm, ServiceRecord, rid_service_date};

use super::types::{MetricsService, ServiceAttributesDetails};

/// Error during DTO to record conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("invalid CRS code: {0}")]
    InvalidCrs(String),

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("invalid RID: {0}")]
    InvalidRid(String),

    #[error("invalid date of service: {0}")]
    InvalidDate(String),
}

/// Expand one metrics service into a record per RID.
///
/// Actual times are left empty; [`apply_details`] fills them in.
pub fn records_from_metrics(
    service: &MetricsService,
    route: &str,
) -> Result<Vec<ServiceRecord>, ConversionError> {
    let attrs = &service.attributes;
    let origin = parse_crs(&attrs.origin_location)?;
    let destination = parse_crs(&attrs.destination_location)?;
    let scheduled_departure = parse_time(&attrs.gbtt_ptd)?;
    let scheduled_arrival = parse_time(&attrs.gbtt_pta)?;

    attrs
        .rids
        .iter()
        .map(|rid| {
            let date = rid_service_date(rid).ok_or_else(|| ConversionError::InvalidRid(rid.clone()))?;
            Ok(ServiceRecord {
                rid: rid.clone(),
                route: route.to_string(),
                date_of_service: date,
                day_type: DayType::of_date(date),
                toc_code: attrs.toc_code.clone().filter(|t| !t.is_empty()),
                origin,
                destination,
                scheduled_departure,
                scheduled_arrival,
                actual_departure: None,
                actual_arrival: None,
                cancel_reason: None,
            })
        })
        .collect()
}

/// Fill actual times and cancellation reason from a `serviceDetails` reply.
///
/// The origin and destination are looked up by CRS; a service that does not
/// call at one of them keeps `None` for that side.
pub fn apply_details(
    record: &mut ServiceRecord,
    details: &ServiceAttributesDetails,
) -> Result<(), ConversionError> {
    let date = NaiveDate::parse_from_str(&details.date_of_service, "%Y-%m-%d")
        .map_err(|_| ConversionError::InvalidDate(details.date_of_service.clone()))?;
    record.date_of_service = date;
    record.day_type = DayType::of_date(date);
    if let Some(toc) = details.toc_code.as_ref().filter(|t| !t.is_empty()) {
        record.toc_code = Some(toc.clone());
    }

    let at = |crs: Crs| {
        details
            .locations
            .iter()
            .find(|l| l.location.eq_ignore_ascii_case(crs.as_str()))
    };

    if let Some(origin) = at(record.origin) {
        record.actual_departure = parse_time(&origin.actual_td)?;
        if record.scheduled_departure.is_none() {
            record.scheduled_departure = parse_time(&origin.gbtt_ptd)?;
        }
    }

    if let Some(dest) = at(record.destination) {
        record.actual_arrival = parse_time(&dest.actual_ta)?;
        if record.scheduled_arrival.is_none() {
            record.scheduled_arrival = parse_time(&dest.gbtt_pta)?;
        }
    }

    record.cancel_reason = details
        .locations
        .iter()
        .map(|l| l.late_canc_reason.trim())
        .find(|r| !r.is_empty())
        .map(str::to_string);

    Ok(())
}

fn parse_crs(s: &str) -> Result<Crs, ConversionError> {
    Crs::parse_lenient(s).map_err(|_| ConversionError::InvalidCrs(s.to_string()))
}

fn parse_time(s: &str) -> Result<Option<Hhmm>, ConversionError> {
    Hhmm::parse_optional(s).map_err(|_| ConversionError::InvalidTime(s.to_string()))
}
