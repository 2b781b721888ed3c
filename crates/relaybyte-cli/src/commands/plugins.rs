use std::path::Path;

use anyhow::Result;
use relaybyte_runtime::descriptor::descriptor_file;
use relaybyte_runtime::discover::collect_archives;
use relaybyte_runtime::{PluginDescriptor, PluginRoots};
use relaybyte_types::PluginKind;

/// Execute the `plugins` command: list plugin directories with their
/// descriptor info.
pub fn execute(config_path: Option<&Path>, kind: Option<PluginKind>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let roots = config.plugins.roots();
    let kinds: Vec<PluginKind> = match kind {
        Some(kind) => vec![kind],
        None => PluginKind::ALL.to_vec(),
    };

    let mut found = false;
    for kind in kinds {
        let names = relaybyte_runtime::discover::list_plugins(&roots.kind_dir(kind))?;
        if names.is_empty() {
            continue;
        }
        found = true;
        println!("{kind}:");
        for name in names {
            print_plugin(&roots, kind, &name);
        }
    }

    if !found {
        println!("No plugins found.");
        println!(
            "Place plugins under {} or set {}",
            roots.home.display(),
            super::PLUGIN_HOME_ENV
        );
    }
    Ok(())
}

fn print_plugin(roots: &PluginRoots, kind: PluginKind, name: &str) {
    let dir = roots.plugin_dir(kind, name);
    let archives = collect_archives(&dir).map_or(0, |a| a.len());
    match PluginDescriptor::load(&dir.join(descriptor_file(kind))) {
        Ok(descriptor) => {
            println!("  {name}  [entry {}, {archives} archives]", descriptor.entry);
            if let Some(description) = &descriptor.description {
                println!("    {description}");
            }
            if !descriptor.checksums.is_empty() {
                println!("    Checksums: {}", descriptor.checksums.len());
            }
        }
        Err(e) => println!("  {name}  (invalid descriptor: {e})"),
    }
}
