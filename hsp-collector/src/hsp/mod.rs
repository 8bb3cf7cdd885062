//! National Rail Historical Service Performance (HSP) client.
//!
//! Key characteristics of HSP:
//! - Both endpoints are JSON POSTs authenticated with HTTP Basic auth
//! - `serviceMetrics` accepts at most a week of dates per request and is
//!   slow (tens of seconds is normal), so timeouts are generous
//! - The API throttles per credential with HTTP 429
//! - Each day a train ran is identified by a RID whose first eight digits
//!   are the service date

mod client;
mod convert;
mod error;
mod rate_limit;
mod retry;
mod types;

pub use client::{
    DEFAULT_BASE_URL, HspClient, HspConfig, RawResponse, ReqwestTransport, SERVICE_DETAILS,
    SERVICE_METRICS, Transport,
};
pub use convert::{ConversionError, apply_details, records_from_metrics};
pub use error::{HspError, classify_status};
pub use rate_limit::{MIN_INTERVAL_FLOOR, RateLimiter};
pub use retry::{RetryContext, RetryPolicy};
pub use types::{
    DetailLocation, Metric, MetricsHeader, MetricsService, ServiceAttributesDetails,
    ServiceAttributesMetrics, ServiceDetailsRequest, ServiceDetailsResponse,
    ServiceMetricsRequest, ServiceMetricsResponse,
};

#[cfg(test)]
pub(crate) use client::testing;
