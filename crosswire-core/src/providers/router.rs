//! Fallback routing across the provider chain
//!
//! One request walks the configured chain in order. Within a provider,
//! transient failures are retried with backoff up to the retry budget;
//! a permanent failure or an exhausted budget advances to the next
//! provider. Once a stream has started flowing, the provider is
//! committed: a mid-stream failure surfaces in-band and is never
//! recovered by switching providers.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::cache::ContinuationCache;
use crate::config::ProviderConfig;
use crate::error::{GatewayError, ProviderAttempt};
use crate::protocol::{CanonicalRequest, CanonicalResponse, StreamEvent};

use super::registry::ProviderRegistry;
use super::retry::RetryPolicy;
use super::{EventStream, ProviderAdapter, ProviderError};

/// A unary response annotated with which provider served it
#[derive(Debug)]
pub struct RoutedResponse {
    pub response: CanonicalResponse,
    pub provider: String,
    pub model: String,
    /// Attempts made before success, including the successful one
    pub attempts: u32,
}

/// A streaming response annotated with which provider serves it
pub struct RoutedStream {
    pub events: EventStream,
    pub provider: String,
    pub model: String,
}

pub struct Router {
    registry: Arc<ProviderRegistry>,
    cache: Arc<ContinuationCache>,
    retry: RetryPolicy,
}

impl Router {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache: Arc<ContinuationCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            cache,
            retry,
        }
    }

    /// Execute a unary request against the chain
    pub async fn execute(
        &self,
        request: &CanonicalRequest,
        chain: &[(String, ProviderConfig)],
    ) -> Result<RoutedResponse, GatewayError> {
        let mut attempted = Vec::new();

        for (name, config) in chain {
            let adapter = match self.resolve(name, config, &mut attempted) {
                Some(adapter) => adapter,
                None => continue,
            };

            let mut attempt = 0u32;
            loop {
                debug!(provider = %name, attempt, "dispatching request");
                match adapter.complete(request).await {
                    Ok(response) => {
                        info!(provider = %name, attempts = attempt + 1, "request served");
                        return Ok(RoutedResponse {
                            response,
                            provider: name.clone(),
                            model: adapter.model().to_string(),
                            attempts: attempt + 1,
                        });
                    }
                    Err(err) if self.retry.should_retry(&err, attempt) => {
                        let delay = self.retry.delay_for(attempt);
                        warn!(provider = %name, attempt, error = %err,
                              delay_ms = delay.as_millis() as u64, "transient failure, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) => {
                        warn!(provider = %name, attempt, error = %err,
                              "provider failed, advancing to next");
                        attempted.push(ProviderAttempt {
                            provider: name.clone(),
                            error: err.to_string(),
                        });
                        break;
                    }
                }
            }
        }

        Err(GatewayError::AllProvidersFailed { attempted })
    }

    /// Execute a streaming request against the chain. Fallback applies
    /// only until a provider accepts the request and returns a stream.
    pub async fn execute_stream(
        &self,
        request: &CanonicalRequest,
        chain: &[(String, ProviderConfig)],
    ) -> Result<RoutedStream, GatewayError> {
        let mut attempted = Vec::new();

        for (name, config) in chain {
            let adapter = match self.resolve(name, config, &mut attempted) {
                Some(adapter) => adapter,
                None => continue,
            };

            let mut attempt = 0u32;
            loop {
                debug!(provider = %name, attempt, "opening stream");
                match adapter.stream(request).await {
                    Ok(events) => {
                        info!(provider = %name, attempts = attempt + 1, "stream opened");
                        return Ok(RoutedStream {
                            events: guard_stream(events),
                            provider: name.clone(),
                            model: adapter.model().to_string(),
                        });
                    }
                    Err(err) if self.retry.should_retry(&err, attempt) => {
                        let delay = self.retry.delay_for(attempt);
                        warn!(provider = %name, attempt, error = %err,
                              delay_ms = delay.as_millis() as u64, "transient failure, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) => {
                        warn!(provider = %name, attempt, error = %err,
                              "provider failed, advancing to next");
                        attempted.push(ProviderAttempt {
                            provider: name.clone(),
                            error: err.to_string(),
                        });
                        break;
                    }
                }
            }
        }

        Err(GatewayError::AllProvidersFailed { attempted })
    }

    fn resolve(
        &self,
        name: &str,
        config: &ProviderConfig,
        attempted: &mut Vec<ProviderAttempt>,
    ) -> Option<Arc<dyn ProviderAdapter>> {
        match self
            .registry
            .resolve(name, config, Arc::clone(&self.cache))
        {
            Ok(adapter) => Some(adapter),
            Err(err) => {
                warn!(provider = %name, error = %err, "cannot resolve provider, skipping");
                attempted.push(ProviderAttempt {
                    provider: name.to_string(),
                    error: err.to_string(),
                });
                None
            }
        }
    }
}

/// Wrap an adapter stream so a transport error item becomes an in-band
/// error event followed by a terminator, and nothing follows the first
/// `message_stop`.
fn guard_stream(mut events: EventStream) -> EventStream {
    Box::pin(async_stream::stream! {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    let stop = matches!(event, StreamEvent::MessageStop);
                    yield Ok::<_, ProviderError>(event);
                    if stop {
                        return;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "stream item failed, terminating in-band");
                    yield Ok(StreamEvent::error("upstream_error", err.to_string()));
                    yield Ok(StreamEvent::MessageStop);
                    return;
                }
            }
        }
        // Upstream ended without a terminator
        yield Ok(StreamEvent::MessageStop);
    })
}
