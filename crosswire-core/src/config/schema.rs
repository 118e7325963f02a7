//! Configuration schema
//!
//! Parsed from YAML into an immutable snapshot. A reload produces a new
//! snapshot swapped in atomically; live snapshots are never mutated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrosswireConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub provider: ProviderSelection,

    /// Per-provider connection blocks, keyed by registry name
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub cache: CacheSettings,

    /// Raw document retained for read-only dot-path lookups
    #[serde(skip)]
    pub(crate) raw: Option<serde_json::Value>,
}

impl CrosswireConfig {
    /// Ordered provider list: primary first, then configured fallbacks
    pub fn provider_chain(&self) -> Vec<String> {
        let mut chain = vec![self.provider.name.clone()];
        for name in &self.provider.fallback_providers {
            if !chain.contains(name) {
                chain.push(name.clone());
            }
        }
        chain
    }

    /// Connection block for a named provider
    pub fn provider_config(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Read-only lookup by dot-separated key path into the raw document,
    /// e.g. `lookup("server.port")`.
    pub fn lookup(&self, key: &str) -> Option<&serde_json::Value> {
        let mut value = self.raw.as_ref()?;
        for part in key.split('.') {
            value = value.get(part)?;
        }
        Some(value)
    }

    /// Structural checks beyond what serde enforces
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.name.is_empty() {
            return Err(ConfigError::Invalid {
                message: "provider.name must not be empty".to_string(),
            });
        }
        for name in self.provider_chain() {
            match self.providers.get(&name) {
                None => {
                    return Err(ConfigError::Invalid {
                        message: format!("provider '{name}' has no configuration block"),
                    })
                }
                Some(provider) if provider.base_url.is_empty() => {
                    return Err(ConfigError::Invalid {
                        message: format!("provider '{name}' has an empty base_url"),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Listener settings consumed by the transport collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Active provider plus ordered fallbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSelection {
    pub name: String,
    #[serde(default)]
    pub fallback_providers: Vec<String>,
}

/// Connection settings for one upstream provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,

    pub model: String,

    pub base_url: String,

    #[serde(default = "default_timeout_secs", alias = "timeout")]
    pub timeout_secs: u64,

    /// Optional outbound HTTP(S) proxy URL
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_timeout_secs() -> u64 {
    300
}

/// Retry/backoff tuning applied per provider attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    10_000
}

/// Continuation-token cache bounds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_max_age_secs")]
    pub max_age_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_age_secs: default_cache_max_age_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

fn default_cache_max_age_secs() -> u64 {
    3600
}

fn default_cache_max_entries() -> usize {
    1000
}
