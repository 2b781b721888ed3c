use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use relaybyte_engine::TransformerRegistry;
use relaybyte_runtime::PluginLoader;

/// Execute the `transformers` command: list built-in stages plus every
/// local stage that loads.
pub fn execute(config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let loader = PluginLoader::new(config.plugins.roots(), config.plugins.limits())?;
    let registry = TransformerRegistry::with_builtins(Arc::new(loader))?;
    let loaded = registry.load_local_all();

    for name in registry.names() {
        let Some(entry) = registry.get(&name) else {
            continue;
        };
        let origin = match &entry.scope {
            Some(scope) => format!("local, scope {}", scope.name()),
            None => "built-in".to_string(),
        };
        println!("  {name:16} ({origin})");
    }
    println!("\n{} transformers, {loaded} loaded from local storage.", registry.len());
    Ok(())
}
