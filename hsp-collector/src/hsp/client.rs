//! HSP HTTP client.
//!
//! Every request goes through [`HspClient::execute`], which spaces requests
//! with the rate limiter, classifies failures and retries the transient ones
//! according to the [`RetryPolicy`].

use std::future::Future;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::{HspError, classify_status};
use super::rate_limit::RateLimiter;
use super::retry::{RetryContext, RetryPolicy};
use super::types::{
    ServiceDetailsRequest, ServiceDetailsResponse, ServiceMetricsRequest, ServiceMetricsResponse,
};

/// Default base URL for the HSP API.
pub const DEFAULT_BASE_URL: &str = "https://hsp-prod.rockshore.net/api/v1";

/// Endpoint returning per-service punctuality and RIDs.
pub const SERVICE_METRICS: &str = "serviceMetrics";

/// Endpoint returning calling points and actual times for one RID.
pub const SERVICE_DETAILS: &str = "serviceDetails";

/// HSP responses routinely take over a minute for week-long windows.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the HSP client.
#[derive(Debug, Clone)]
pub struct HspConfig {
    pub username: String,
    pub password: String,
    /// Base URL for the API (defaults to production HSP)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    pub min_interval: Duration,
    pub max_interval: Duration,
}

impl HspConfig {
    /// Create a new config with the given credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            min_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(4),
        }
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the range the rate limiter draws request spacing from.
    pub fn with_interval(mut self, min: Duration, max: Duration) -> Self {
        self.min_interval = min;
        self.max_interval = max;
        self
    }
}

/// A raw HTTP reply before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Sends one JSON POST and returns the raw reply.
///
/// Transport-level failures (timeouts, refused connections) are returned as
/// [`HspError::Network`]; HTTP statuses are left for the caller to classify.
pub trait Transport {
    fn post_json(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<RawResponse, HspError>> + Send;
}

/// [`Transport`] over reqwest with Basic authentication.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(config: &HspConfig) -> Result<Self, HspError> {
        let mut headers = HeaderMap::new();

        let token = STANDARD.encode(format!("{}:{}", config.username, config.password));
        let mut auth = HeaderValue::from_str(&format!("Basic {token}")).map_err(|_| {
            HspError::Validation {
                message: "credentials cannot be sent as an HTTP header".to_string(),
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Transport for ReqwestTransport {
    async fn post_json(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<RawResponse, HspError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self.http.post(&url).json(payload).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

/// HSP API client.
///
/// Requests are serialised through a single rate limiter, so one client
/// never exceeds the configured request rate however it is shared.
#[derive(Debug)]
pub struct HspClient<T = ReqwestTransport> {
    transport: T,
    limiter: Mutex<RateLimiter>,
    retry: RetryPolicy,
}

impl HspClient<ReqwestTransport> {
    /// Create a client talking to the real API.
    pub fn new(config: HspConfig) -> Result<Self, HspError> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(transport, &config))
    }
}

impl<T: Transport> HspClient<T> {
    /// Create a client over an arbitrary transport.
    pub fn with_transport(transport: T, config: &HspConfig) -> Self {
        Self {
            transport,
            limiter: Mutex::new(RateLimiter::new(config.min_interval, config.max_interval)),
            retry: config.retry.clone(),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// POST `payload` to `endpoint`, retrying transient failures.
    ///
    /// Returns the parsed JSON body, or the last classified error once the
    /// error is non-retryable or the attempt budget is spent.
    pub async fn execute(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, HspError> {
        let mut ctx = RetryContext::new(&self.retry);

        loop {
            let error = match self.attempt(endpoint, payload).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !self.retry.should_retry(&error, ctx.attempt) {
                if error.is_retryable() {
                    warn!(
                        endpoint,
                        attempts = ctx.attempt + 1,
                        error = %error,
                        "giving up after exhausting retries"
                    );
                }
                return Err(error);
            }

            let delay = self.retry.delay(ctx.attempt);
            warn!(
                endpoint,
                attempt = ctx.attempt + 1,
                max_attempts = ctx.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "HSP request failed, retrying"
            );
            ctx.record_failure(error);
            tokio::time::sleep(delay).await;
        }
    }

    /// One rate-limited request with classification.
    async fn attempt(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, HspError> {
        self.limiter.lock().await.acquire().await;

        debug!(endpoint, "sending HSP request");
        let response = self.transport.post_json(endpoint, payload).await?;
        classify_status(response.status, &response.body)?;

        serde_json::from_str(&response.body).map_err(|e| HspError::decode(e, &response.body))
    }

    /// Execute with a typed request body and response.
    pub async fn call<Req, Resp>(&self, endpoint: &str, request: &Req) -> Result<Resp, HspError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request).map_err(|e| HspError::Validation {
            message: format!("cannot encode request: {e}"),
        })?;
        let value = self.execute(endpoint, &payload).await?;
        serde_json::from_value(value).map_err(|e| HspError::Decode {
            message: e.to_string(),
            body: None,
        })
    }

    /// Fetch punctuality metrics and RIDs for a route and date window.
    pub async fn service_metrics(
        &self,
        request: &ServiceMetricsRequest,
    ) -> Result<ServiceMetricsResponse, HspError> {
        self.call(SERVICE_METRICS, request).await
    }

    /// Fetch calling points and actual times for one RID.
    pub async fn service_details(&self, rid: &str) -> Result<ServiceDetailsResponse, HspError> {
        let request = ServiceDetailsRequest {
            rid: rid.to_string(),
        };
        self.call(SERVICE_DETAILS, &request).await
    }
}
