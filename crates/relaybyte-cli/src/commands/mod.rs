pub mod check;
pub mod plugins;
pub mod transformers;

use std::path::Path;

use anyhow::{Context, Result};
use relaybyte_engine::config::{parser, validator, CoreConfig};

/// Environment override for the plugin home.
pub const PLUGIN_HOME_ENV: &str = "RELAYBYTE_PLUGIN_HOME";

/// Load and validate `path`, or fall back to defaults. The plugin home
/// env var wins over both.
pub fn load_config(path: Option<&Path>) -> Result<CoreConfig> {
    let mut config = match path {
        Some(path) => {
            let config = parser::parse_config(path)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            validator::validate_config(&config)?;
            config
        }
        None => CoreConfig::default(),
    };
    if let Ok(home) = std::env::var(PLUGIN_HOME_ENV) {
        config.plugins.home = home.into();
    }
    Ok(config)
}
