use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use relaybyte_engine::statistics::report::format_bytes;
use relaybyte_engine::{build_stages, ErrorLimit, TransformerRegistry};
use relaybyte_runtime::PluginLoader;

/// Execute the `check` command: validate the config and bind every
/// configured transform stage.
pub fn execute(config_path: &Path) -> Result<()> {
    // 1. Parse and validate YAML
    let config = super::load_config(Some(config_path))?;
    println!("Configuration structure: OK");

    let channel = &config.channel;
    println!(
        "Channel:           {} records, {}",
        channel.capacity,
        format_bytes(i64::try_from(channel.byte_capacity.bytes()).unwrap_or(i64::MAX)),
    );
    ErrorLimit::from_config(&config.errors)?;

    // 2. Plugin home
    let loader = PluginLoader::new(config.plugins.roots(), config.plugins.limits())
        .with_context(|| {
            format!("Failed to open plugin home: {}", config.plugins.home.display())
        })?;
    println!(
        "Plugin home:       {} ({} shared archives)",
        config.plugins.home.display(),
        loader.host_scope().archives().len()
    );

    // 3. Bind transform stages
    let registry = TransformerRegistry::with_builtins(Arc::new(loader))?;
    let stages = build_stages(&config.transformers, &registry)?;
    for (i, stage) in stages.iter().enumerate() {
        let scope = stage.scope().map_or("host", |s| s.name());
        let column = stage
            .args()
            .column_index
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        println!(
            "{:18} {} OK  (column {column}, scope {scope})",
            format!("Transform[{i}]:"),
            stage.name(),
        );
    }

    println!("\nAll checks passed.");
    Ok(())
}
