//! HSP client error types and response classification.

/// Maximum number of body characters kept in error messages.
const BODY_PREVIEW_CHARS: usize = 500;

/// Errors from the HSP client.
///
/// The variant decides what the caller does next: `Network`, `RateLimited`
/// and `Api` are retried by the executor; `Authentication` aborts the whole
/// collection run; `Validation` and `Decode` fail only the current task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HspError {
    /// Timeout, connection failure or other transport problem.
    #[error("network error: {message}")]
    Network { message: String },

    /// HTTP 429 from HSP.
    #[error("rate limited by HSP: {message}")]
    RateLimited { message: String },

    /// Server error or unexpected status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Credentials rejected (HTTP 401/403).
    #[error("authentication failed (HTTP {status}): check HSP_USERNAME and HSP_PASSWORD")]
    Authentication { status: u16 },

    /// HSP rejected the request payload (HTTP 400).
    #[error("request rejected by HSP: {message}")]
    Validation { message: String },

    /// A successful response whose body could not be parsed.
    #[error("JSON parse error: {message}")]
    Decode {
        message: String,
        body: Option<String>,
    },
}

impl HspError {
    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HspError::Network { .. } | HspError::RateLimited { .. } | HspError::Api { .. }
        )
    }

    /// Whether this error invalidates every later request of the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HspError::Authentication { .. })
    }

    /// Build a `Decode` error keeping a preview of the offending body.
    pub fn decode(err: impl std::fmt::Display, body: &str) -> Self {
        HspError::Decode {
            message: err.to_string(),
            body: Some(preview(body)),
        }
    }
}

/// Classify an HTTP status and body.
///
/// Returns `Ok(())` for any 2xx status. Pure: performs no I/O.
///
/// | Status | Error | Retried |
/// |--------|-------|---------|
/// | 400 | `Validation` | no |
/// | 401, 403 | `Authentication` | no, aborts run |
/// | 429 | `RateLimited` | yes |
/// | 5xx, other | `Api` | yes |
pub fn classify_status(status: u16, body: &str) -> Result<(), HspError> {
    match status {
        200..=299 => Ok(()),
        400 => Err(HspError::Validation {
            message: preview(body),
        }),
        401 | 403 => Err(HspError::Authentication { status }),
        429 => Err(HspError::RateLimited {
            message: preview(body),
        }),
        _ => Err(HspError::Api {
            status,
            message: preview(body),
        }),
    }
}

fn preview(body: &str) -> String {
    body.trim().chars().take(BODY_PREVIEW_CHARS).collect()
}

impl From<reqwest::Error> for HspError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return HspError::Decode {
                message: err.to_string(),
                body: None,
            };
        }
        if let Some(status) = err.status()
            && let Err(classified) = classify_status(status.as_u16(), "")
        {
            return classified;
        }
        HspError::Network {
            message: err.to_string(),
        }
    }
}
