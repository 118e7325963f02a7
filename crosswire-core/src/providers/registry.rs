//! Provider registry
//!
//! Adapters are registered explicitly by name. Resolution happens per
//! request against the configured provider chain, so a registry update
//! takes effect on the next request without restart.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::cache::ContinuationCache;
use crate::config::ProviderConfig;
use crate::error::GatewayError;

use super::deepseek::DeepseekAdapter;
use super::gemini::GeminiAdapter;
use super::grok::GrokAdapter;
use super::{ProviderAdapter, ProviderError};

/// Constructs an adapter from its configuration block
pub type AdapterFactory =
    fn(&ProviderConfig, Arc<ContinuationCache>) -> Result<Arc<dyn ProviderAdapter>, ProviderError>;

/// Name-to-factory map for provider adapters
#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<HashMap<String, AdapterFactory>>,
}

impl ProviderRegistry {
    /// Empty registry with no adapters
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in adapters registered
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("gemini", |config, cache| {
            Ok(Arc::new(GeminiAdapter::new(config, cache)?))
        });
        registry.register("grok", |config, _cache| {
            Ok(Arc::new(GrokAdapter::new(config)?))
        });
        registry.register("deepseek", |config, _cache| {
            Ok(Arc::new(DeepseekAdapter::new(config)?))
        });
        registry
    }

    /// Register a factory under a name. Names are case-insensitive and a
    /// later registration replaces an earlier one.
    pub fn register(&self, name: &str, factory: AdapterFactory) {
        let key = name.to_lowercase();
        debug!(provider = %key, "registering provider adapter");
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, factory);
    }

    /// Build an adapter for the named provider
    pub fn resolve(
        &self,
        name: &str,
        config: &ProviderConfig,
        cache: Arc<ContinuationCache>,
    ) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        let factory = factories
            .get(&name.to_lowercase())
            .ok_or_else(|| GatewayError::UnknownProvider {
                name: name.to_string(),
                available: {
                    let mut names: Vec<String> = factories.keys().cloned().collect();
                    names.sort();
                    names
                },
            })?;
        factory(config, cache).map_err(|source| GatewayError::ProviderInit {
            name: name.to_string(),
            source,
        })
    }

    /// Sorted names of all registered providers
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
