//! Configuration loading and hot-reload snapshots
//!
//! Configuration is consumed as an immutable snapshot. The gateway polls
//! [`ConfigHandle::check_and_reload`] between requests; when the file on disk
//! changed, a freshly parsed snapshot is swapped in atomically. Live
//! snapshots are never mutated in place.

mod env;
mod error;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use schema::{
    CacheSettings, CrosswireConfig, ProviderConfig, ProviderSelection, RetrySettings,
    ServerConfig,
};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use tracing::info;

/// Load a configuration from a YAML file, interpolating `${VAR}` references
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<CrosswireConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    from_yaml_str(&content).map_err(|e| match e {
        ConfigError::Parse { message, .. } => ConfigError::Parse {
            path: path.to_string_lossy().to_string(),
            message,
        },
        other => other,
    })
}

/// Parse a configuration from a YAML string
pub fn from_yaml_str(content: &str) -> ConfigResult<CrosswireConfig> {
    let interpolated = env::interpolate_env_vars(content)?;

    let mut config: CrosswireConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;

    // Keep the raw document for dot-path lookups
    let raw: serde_yaml::Value =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
    config.raw = serde_json::to_value(raw).ok();

    config.validate()?;
    Ok(config)
}

#[derive(Debug)]
struct Snapshot {
    modified: Option<SystemTime>,
    config: Arc<CrosswireConfig>,
}

/// Atomically swappable configuration snapshot with file-staleness polling
#[derive(Debug)]
pub struct ConfigHandle {
    path: Option<PathBuf>,
    inner: RwLock<Snapshot>,
}

impl ConfigHandle {
    /// Load the initial snapshot from a YAML file and remember its mtime
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let config = load_from_yaml(&path)?;
        let modified = file_mtime(&path);
        Ok(Self {
            path: Some(path),
            inner: RwLock::new(Snapshot {
                modified,
                config: Arc::new(config),
            }),
        })
    }

    /// Wrap an already-built configuration; `check_and_reload` is a no-op
    pub fn from_config(config: CrosswireConfig) -> Self {
        Self {
            path: None,
            inner: RwLock::new(Snapshot {
                modified: None,
                config: Arc::new(config),
            }),
        }
    }

    /// The current immutable snapshot
    pub fn current(&self) -> Arc<CrosswireConfig> {
        let snapshot = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&snapshot.config)
    }

    /// Poll the backing file; when it changed, parse and swap in a new
    /// snapshot. Returns whether a reload happened. A file that no longer
    /// parses leaves the previous snapshot in place and surfaces the error.
    pub fn check_and_reload(&self) -> ConfigResult<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };

        let modified = file_mtime(path);
        {
            let snapshot = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if modified == snapshot.modified {
                return Ok(false);
            }
        }

        let config = load_from_yaml(path)?;
        let mut snapshot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        snapshot.modified = modified;
        snapshot.config = Arc::new(config);
        info!(path = %path.display(), "configuration reloaded");
        Ok(true)
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
server:
  host: 127.0.0.1
  port: 8080
provider:
  name: gemini
  fallback_providers:
    - deepseek
providers:
  gemini:
    api_key: test-key
    model: gemini-2.5-pro
    base_url: https://generativelanguage.googleapis.com
    timeout: 300
  deepseek:
    api_key: test-key
    model: deepseek-chat
    base_url: https://api.deepseek.com/anthropic
"#;

    #[test]
    fn parses_sample_yaml() {
        let config = from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.provider.name, "gemini");
        assert_eq!(config.provider_chain(), vec!["gemini", "deepseek"]);
        assert_eq!(
            config.provider_config("deepseek").unwrap().model,
            "deepseek-chat"
        );
        // `timeout` alias accepted, default applied when absent
        assert_eq!(config.provider_config("gemini").unwrap().timeout_secs, 300);
        assert_eq!(config.provider_config("deepseek").unwrap().timeout_secs, 300);
    }

    #[test]
    fn dot_path_lookup_reads_raw_document() {
        let config = from_yaml_str(SAMPLE).unwrap();
        assert_eq!(
            config.lookup("server.port").and_then(|v| v.as_u64()),
            Some(8080)
        );
        assert_eq!(
            config
                .lookup("providers.gemini.model")
                .and_then(|v| v.as_str()),
            Some("gemini-2.5-pro")
        );
        assert!(config.lookup("no.such.key").is_none());
    }

    #[test]
    fn chain_provider_without_block_is_rejected() {
        let yaml = r#"
provider:
  name: gemini
  fallback_providers: [grok]
providers:
  gemini:
    api_key: k
    model: m
    base_url: https://example.com
"#;
        let result = from_yaml_str(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn duplicate_fallback_is_deduplicated_in_chain() {
        let yaml = r#"
provider:
  name: gemini
  fallback_providers: [gemini]
providers:
  gemini:
    api_key: k
    model: m
    base_url: https://example.com
"#;
        let config = from_yaml_str(yaml).unwrap();
        assert_eq!(config.provider_chain(), vec!["gemini"]);
    }
}
