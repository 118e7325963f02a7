//! Environment variable interpolation for configuration

use regex::Regex;
use std::env;

use super::error::ConfigError;

/// Interpolate `${VAR}` references in a configuration string before parsing
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let env_var_pattern = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static pattern");
    let mut result = content.to_string();

    for cap in env_var_pattern.captures_iter(content) {
        let full_match = cap.get(0).expect("capture 0 always present").as_str();
        let var_name = &cap[1];

        match env::var(var_name) {
            Ok(value) => {
                result = result.replace(full_match, &value);
            }
            Err(_) => {
                return Err(ConfigError::EnvVarNotFound {
                    var: var_name.to_string(),
                });
            }
        }
    }

    Ok(result)
}
