//! Provider error types

use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised while talking to an upstream provider
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Upstream rejected the request or failed with a non-success status
    #[error("upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// Attempt exceeded the configured timeout
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Connection-level failure before any status was received
    #[error("network error: {0}")]
    Network(String),

    /// Upstream payload could not be decoded
    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    /// Adapter misconfiguration (bad proxy URL, client build failure)
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// Whether this failure class is expected to be retry-eligible.
    ///
    /// Rate limiting (429) and server-unavailable classes (5xx) are
    /// transient; timeouts and connection failures likewise. Permanent
    /// rejections (4xx other than 429) and decode failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Upstream { status, .. } => {
                *status == 429 || (500..=599).contains(status)
            }
            ProviderError::Timeout(_) => true,
            ProviderError::Network(_) => true,
            ProviderError::Decode(_) => false,
            ProviderError::Configuration(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // The per-attempt timeout comes from the client builder; reqwest
            // does not report the configured value back.
            ProviderError::Timeout(0)
        } else if err.is_connect() {
            ProviderError::Network(format!("connection failed: {err}"))
        } else if let Some(status) = err.status() {
            ProviderError::Upstream {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}
