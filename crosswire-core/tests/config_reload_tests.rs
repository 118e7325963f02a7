//! Configuration loading and hot reload from disk

use std::fs;
use std::time::Duration;

use crosswire_core::config::{ConfigError, ConfigHandle};

const INITIAL: &str = r#"
server:
  host: 127.0.0.1
  port: 8080
provider:
  name: gemini
providers:
  gemini:
    api_key: test-key
    model: gemini-2.5-pro
    base_url: https://example.com
"#;

const UPDATED: &str = r#"
server:
  host: 127.0.0.1
  port: 8080
provider:
  name: deepseek
providers:
  deepseek:
    api_key: test-key
    model: deepseek-chat
    base_url: https://example.com/anthropic
"#;

fn write_config(path: &std::path::Path, content: &str) {
    fs::write(path, content).unwrap();
}

#[test]
fn reload_swaps_in_new_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crosswire.yaml");
    write_config(&path, INITIAL);

    let handle = ConfigHandle::load(&path).unwrap();
    assert_eq!(handle.current().provider.name, "gemini");

    // mtime granularity on some filesystems is one second or worse; a short
    // sleep keeps the modified timestamp distinguishable
    std::thread::sleep(Duration::from_millis(1100));
    write_config(&path, UPDATED);

    assert!(handle.check_and_reload().unwrap());
    assert_eq!(handle.current().provider.name, "deepseek");
    assert!(!handle.check_and_reload().unwrap());
}

#[test]
fn broken_reload_keeps_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crosswire.yaml");
    write_config(&path, INITIAL);

    let handle = ConfigHandle::load(&path).unwrap();

    std::thread::sleep(Duration::from_millis(1100));
    write_config(&path, "provider: [not, a, mapping");

    assert!(handle.check_and_reload().is_err());
    assert_eq!(handle.current().provider.name, "gemini");
}

#[test]
fn env_interpolation_resolves_at_load_time() {
    std::env::set_var("CROSSWIRE_TEST_KEY", "from-env");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crosswire.yaml");
    write_config(
        &path,
        r#"
provider:
  name: gemini
providers:
  gemini:
    api_key: ${CROSSWIRE_TEST_KEY}
    model: gemini-2.5-pro
    base_url: https://example.com
"#,
    );

    let handle = ConfigHandle::load(&path).unwrap();
    assert_eq!(
        handle.current().provider_config("gemini").unwrap().api_key,
        "from-env"
    );
}

#[test]
fn missing_env_var_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crosswire.yaml");
    write_config(
        &path,
        r#"
provider:
  name: gemini
providers:
  gemini:
    api_key: ${CROSSWIRE_DEFINITELY_UNSET_VAR}
    model: m
    base_url: https://example.com
"#,
    );

    let err = ConfigHandle::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::EnvVarNotFound { .. }));
}
