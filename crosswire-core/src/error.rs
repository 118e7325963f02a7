//! Gateway-level error types

use thiserror::Error;

use crate::config::ConfigError;
use crate::protocol::ValidationError;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// A single failed attempt against a named provider
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub provider: String,
    pub error: String,
}

/// Errors surfaced to gateway callers
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request failed structural validation before routing
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// Configured provider name has no registered adapter
    #[error("unknown provider '{name}', available: {}", available.join(", "))]
    UnknownProvider {
        name: String,
        available: Vec<String>,
    },

    /// Adapter construction failed for a configured provider
    #[error("failed to initialize provider '{name}': {source}")]
    ProviderInit {
        name: String,
        source: crate::providers::ProviderError,
    },

    /// Every provider in the fallback chain was exhausted
    #[error("all providers failed: {}", format_attempts(attempted))]
    AllProvidersFailed { attempted: Vec<ProviderAttempt> },

    /// Configuration could not be loaded or was invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

fn format_attempts(attempts: &[ProviderAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} ({})", a.provider, a.error))
        .collect::<Vec<_>>()
        .join("; ")
}
