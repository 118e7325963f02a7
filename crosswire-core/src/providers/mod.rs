//! Provider adapters and routing
//!
//! Each upstream API gets an adapter implementing [`ProviderAdapter`].
//! Adapters translate the canonical request into the upstream's wire
//! format, issue the HTTP call, and translate the result (unary body or
//! SSE stream) back into canonical form. The [`registry`] maps provider
//! names to adapter factories and the [`router`] walks the configured
//! fallback chain.

pub mod deepseek;
pub mod error;
pub mod gemini;
pub mod grok;
pub mod openai_compat;
pub mod registry;
pub mod retry;
pub mod router;
pub mod sanitize;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;

use crate::config::ProviderConfig;
use crate::protocol::{CanonicalRequest, CanonicalResponse, StreamEvent};

pub use error::{ProviderError, ProviderResult};
pub use registry::{AdapterFactory, ProviderRegistry};
pub use retry::RetryPolicy;
pub use router::{RoutedResponse, RoutedStream, Router};

/// Boxed stream of canonical events produced by an adapter
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ProviderError>> + Send>>;

/// A single upstream LLM API
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable adapter name used in configuration and logs
    fn name(&self) -> &'static str;

    /// Upstream model identifier this adapter is configured for
    fn model(&self) -> &str;

    /// Issue a non-streaming request and return the complete response
    async fn complete(&self, request: &CanonicalRequest)
        -> Result<CanonicalResponse, ProviderError>;

    /// Issue a streaming request and return the canonical event stream
    async fn stream(&self, request: &CanonicalRequest) -> Result<EventStream, ProviderError>;
}

/// Build an HTTP client honoring the provider's timeout and proxy settings.
pub(crate) fn build_client(config: &ProviderConfig) -> Result<reqwest::Client, ProviderError> {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
    if let Some(proxy_url) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ProviderError::Configuration(format!("invalid proxy URL: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| ProviderError::Configuration(format!("failed to build HTTP client: {e}")))
}
