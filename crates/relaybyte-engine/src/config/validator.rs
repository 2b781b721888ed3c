//! Semantic validation for parsed core configuration values.

use anyhow::{bail, Result};

use crate::config::types::{ChannelConfig, CoreConfig, TransformerSpec};
use crate::transform::registry::BUILTIN_PREFIX;
use crate::transform::SCRIPT_STAGE;

fn validate_channel(channel: &ChannelConfig, errors: &mut Vec<String>) {
    if channel.capacity == 0 {
        errors.push("channel.capacity must be > 0".to_string());
    }
    if channel.byte_capacity.bytes() == 0 {
        errors.push("channel.byte_capacity must be > 0".to_string());
    }
    if channel.byte_speed.is_some_and(|b| b.bytes() == 0) {
        errors.push("channel.byte_speed must be > 0 when set".to_string());
    }
    if channel.record_speed == Some(0) {
        errors.push("channel.record_speed must be > 0 when set".to_string());
    }
    let governed = channel.byte_speed.is_some() || channel.record_speed.is_some();
    if governed && channel.flow_control_interval_ms == 0 {
        errors.push(
            "channel.flow_control_interval_ms must be > 0 when a speed limit is set".to_string(),
        );
    }
}

fn validate_transformer(index: usize, spec: &TransformerSpec, errors: &mut Vec<String>) {
    let context = format!("transformers[{index}]");
    let name = spec.name.trim();
    if name.is_empty() {
        errors.push(format!("{context}: name must not be empty"));
        return;
    }
    if name == SCRIPT_STAGE {
        if spec.code.is_none() && spec.code_file.is_none() {
            errors.push(format!("{context} ({name}): requires `code` or `code_file`"));
        }
    } else if name.starts_with(BUILTIN_PREFIX) && spec.column_index.is_none() {
        errors.push(format!("{context} ({name}): column_index is required"));
    }
}

/// Validate a parsed core configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing every validation failure found.
pub fn validate_config(config: &CoreConfig) -> Result<()> {
    let mut errors = Vec::new();

    validate_channel(&config.channel, &mut errors);

    if config.exchanger.buffer_size == 0 {
        errors.push("exchanger.buffer_size must be > 0".to_string());
    }

    if config.plugins.home.as_os_str().is_empty() {
        errors.push("plugins.home must not be empty".to_string());
    }
    if config.plugins.max_memory.is_some_and(|m| m.bytes() == 0) {
        errors.push("plugins.max_memory must be > 0 when set".to_string());
    }

    if let Some(pct) = config.errors.percentage_limit {
        if !(0.0..=1.0).contains(&pct) {
            errors.push(format!(
                "errors.percentage_limit must be within [0, 1], got {pct}"
            ));
        }
    }

    for (index, spec) in config.transformers.iter().enumerate() {
        validate_transformer(index, spec, &mut errors);
    }
    let scripts = config
        .transformers
        .iter()
        .filter(|t| t.name.trim() == SCRIPT_STAGE)
        .count();
    if scripts > 1 {
        errors.push(format!(
            "{SCRIPT_STAGE} may be configured at most once, found {scripts}"
        ));
    }

    if !errors.is_empty() {
        bail!("Configuration validation failed:\n  - {}", errors.join("\n  - "));
    }

    Ok(())
}
