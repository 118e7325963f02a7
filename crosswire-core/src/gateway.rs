//! Gateway facade
//!
//! Ties the pieces together for a transport layer: validates incoming
//! canonical requests, refreshes the configuration snapshot, evicts stale
//! continuation tokens, and hands the request to the router. The gateway
//! itself is transport-agnostic; an HTTP server maps its methods onto
//! endpoints.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::ContinuationCache;
use crate::config::{ConfigHandle, ProviderConfig};
use crate::error::GatewayError;
use crate::protocol::{new_request_id, validate, CanonicalRequest};
use crate::providers::{
    ProviderRegistry, RetryPolicy, RoutedResponse, RoutedStream, Router,
};

/// Model ids advertised to canonical-format callers
const ADVERTISED_MODELS: [&str; 2] = ["claude-3-5-sonnet-20241022", "claude-3-opus-20240229"];

/// Health payload for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub status: &'static str,
    /// Active primary provider name
    pub provider: String,
}

/// OpenAI-style model listing with the proxied upstream model attached
#[derive(Debug, Clone, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: &'static str,
    /// Upstream model actually answering for this id
    pub proxied_to: String,
}

pub struct Gateway {
    config: ConfigHandle,
    registry: Arc<ProviderRegistry>,
    cache: Arc<ContinuationCache>,
}

impl Gateway {
    /// Gateway with the built-in provider adapters
    pub fn new(config: ConfigHandle) -> Self {
        Self::with_registry(config, Arc::new(ProviderRegistry::with_builtins()))
    }

    /// Gateway with a caller-supplied registry
    pub fn with_registry(config: ConfigHandle, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            config,
            registry,
            cache: Arc::new(ContinuationCache::new()),
        }
    }

    pub fn cache(&self) -> &Arc<ContinuationCache> {
        &self.cache
    }

    /// Serve a unary request through the provider chain
    pub async fn handle(&self, request: CanonicalRequest) -> Result<RoutedResponse, GatewayError> {
        let request_id = new_request_id();
        validate(&request)?;

        let (router, chain) = self.prepare(&request_id);
        info!(request_id = %request_id, model = %request.model,
              messages = request.messages.len(), "handling request");
        router.execute(&request, &chain).await
    }

    /// Serve a streaming request through the provider chain
    pub async fn handle_stream(
        &self,
        request: CanonicalRequest,
    ) -> Result<RoutedStream, GatewayError> {
        let request_id = new_request_id();
        validate(&request)?;

        let (router, chain) = self.prepare(&request_id);
        info!(request_id = %request_id, model = %request.model,
              messages = request.messages.len(), "handling streaming request");
        router.execute_stream(&request, &chain).await
    }

    /// Health payload naming the active primary provider
    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            status: "healthy",
            provider: self.config.current().provider.name.clone(),
        }
    }

    /// Advertised model listing, each entry naming the upstream model the
    /// primary provider maps it to
    pub fn list_models(&self) -> ModelList {
        let snapshot = self.config.current();
        let proxied_to = snapshot
            .provider_config(&snapshot.provider.name)
            .map(|p| p.model.clone())
            .unwrap_or_default();
        ModelList {
            object: "list",
            data: ADVERTISED_MODELS
                .iter()
                .map(|id| ModelEntry {
                    id: (*id).to_string(),
                    object: "model",
                    created: 1698959748,
                    owned_by: "anthropic",
                    proxied_to: proxied_to.clone(),
                })
                .collect(),
        }
    }

    /// Refresh the snapshot, evict stale cache entries, and build the
    /// per-request router and provider chain.
    fn prepare(&self, request_id: &str) -> (Router, Vec<(String, ProviderConfig)>) {
        if let Err(err) = self.config.check_and_reload() {
            warn!(request_id = %request_id, error = %err,
                  "config reload failed, keeping previous snapshot");
        }
        let snapshot = self.config.current();

        self.cache.evict(
            Duration::from_secs(snapshot.cache.max_age_secs),
            snapshot.cache.max_entries,
        );

        let chain: Vec<(String, ProviderConfig)> = snapshot
            .provider_chain()
            .into_iter()
            .filter_map(|name| {
                match snapshot.provider_config(&name) {
                    Some(config) => Some((name, config.clone())),
                    None => {
                        warn!(provider = %name, "provider in chain has no configuration block");
                        None
                    }
                }
            })
            .collect();

        let router = Router::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.cache),
            RetryPolicy::from(&snapshot.retry),
        );
        (router, chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_yaml_str;
    use crate::protocol::{Message, ValidationError};

    const CONFIG: &str = r#"
provider:
  name: gemini
  fallback_providers: [deepseek]
providers:
  gemini:
    api_key: k
    model: gemini-2.5-pro
    base_url: https://example.com
  deepseek:
    api_key: k
    model: deepseek-chat
    base_url: https://example.com/anthropic
"#;

    fn gateway() -> Gateway {
        let config = from_yaml_str(CONFIG).unwrap();
        Gateway::new(ConfigHandle::from_config(config))
    }

    #[test]
    fn status_names_primary_provider() {
        let status = gateway().status();
        assert_eq!(status.status, "healthy");
        assert_eq!(status.provider, "gemini");
    }

    #[test]
    fn model_listing_maps_to_upstream_model() {
        let models = gateway().list_models();
        assert_eq!(models.object, "list");
        assert_eq!(models.data.len(), 2);
        for entry in &models.data {
            assert_eq!(entry.proxied_to, "gemini-2.5-pro");
            assert_eq!(entry.owned_by, "anthropic");
        }
        assert_eq!(models.data[0].id, "claude-3-5-sonnet-20241022");
    }

    #[tokio::test]
    async fn invalid_request_fails_before_routing() {
        let err = gateway()
            .handle(CanonicalRequest::new("m", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Validation(ValidationError::EmptyMessages)
        ));
    }

    #[tokio::test]
    async fn zero_max_tokens_fails_before_routing() {
        let request =
            CanonicalRequest::new("m", vec![Message::user("hi")]).with_max_tokens(0);
        let err = gateway().handle(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }
}
