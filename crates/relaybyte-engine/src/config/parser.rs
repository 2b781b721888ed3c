//! Core YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::CoreConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let result = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_else(|_| {
            missing.push(cap[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }

    Ok(result.into_owned())
}

/// Parse a core YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_config_str(yaml_str: &str) -> Result<CoreConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: CoreConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse core YAML")?;
    Ok(config)
}

/// Parse a core YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_config(path: &Path) -> Result<CoreConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("RX_TEST_HOME", "/opt/relay/plugin");
        let input = "plugins:\n  home: ${RX_TEST_HOME}";
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("/opt/relay/plugin"));
        assert!(!result.contains("${RX_TEST_HOME}"));
        std::env::remove_var("RX_TEST_HOME");
    }

    #[test]
    fn test_missing_env_vars_are_all_reported() {
        let err = substitute_env_vars("a: ${RX_NOPE_ONE}\nb: ${RX_NOPE_TWO}").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("RX_NOPE_ONE"));
        assert!(msg.contains("RX_NOPE_TWO"));
    }

    #[test]
    fn test_no_env_vars_passthrough() {
        let input = "channel:\n  capacity: 16";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
channel:
  capacity: 64
  byte_capacity: 1mb
  byte_speed: 512kb
  record_speed: 1000
  wait_timeout_ms: 5000
exchanger:
  buffer_size: 8
plugins:
  home: /opt/relay/plugin
  max_memory: 64mb
errors:
  record_limit: 10
transformers:
  - name: dx_filter
    column_index: 0
    params: [">", "10"]
  - name: dx_script
    code: "(module)"
    context:
      region: eu
"#;
        let config = parse_config_str(yaml).unwrap();
        assert_eq!(config.channel.capacity, 64);
        assert_eq!(config.channel.byte_capacity.bytes(), 1024 * 1024);
        assert_eq!(config.channel.byte_speed.map(|b| b.bytes()), Some(512 * 1024));
        assert_eq!(config.channel.flow_control_interval_ms, 1000);
        assert_eq!(config.exchanger.buffer_size, 8);
        assert_eq!(config.errors.record_limit, Some(10));
        assert_eq!(config.transformers.len(), 2);
        assert_eq!(config.transformers[0].params, vec![">", "10"]);
        assert_eq!(
            config.transformers[1].context.get("region"),
            Some(&serde_json::json!("eu"))
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse_config_str("channel:\n  capacty: 3").unwrap_err();
        assert!(format!("{err:#}").contains("capacty"));
    }

    #[test]
    fn test_parse_missing_file() {
        let err = parse_config(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
