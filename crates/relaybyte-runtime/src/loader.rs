//! Plugin loader: directory layout, scope cache and entry-point resolution.
//!
//! Layout under the plugin home:
//!
//! ```text
//! <home>/lib/*.wasm                      shared archives (host scope)
//! <home>/reader/<name>/plugin.json       adapter descriptor
//! <home>/reader/<name>/**/*.wasm         adapter archives
//! <home>/writer/<name>/...
//! <transformer_home>/<name>/transformer.json
//! <transformer_home>/<name>/**/*.wasm
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use relaybyte_types::{ContainerKind, PluginKind};
use wasmtime::{Config, Engine};

use crate::descriptor::{descriptor_file, PluginDescriptor};
use crate::discover::list_plugins;
use crate::error::Result;
use crate::limits::GuestLimits;
use crate::scope::{IsolationScope, ResolvedSymbol};

/// Root directories for each plugin kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRoots {
    /// Plugin home holding `lib/`, `reader/` and `writer/`.
    pub home: PathBuf,
    /// Local-storage directory for transform stages.
    pub transformer_home: PathBuf,
}

impl PluginRoots {
    /// Roots with the transform storage at `<home>/transformer`.
    #[must_use]
    pub fn new(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let transformer_home = home.join(PluginKind::Transformer.as_str());
        Self {
            home,
            transformer_home,
        }
    }

    #[must_use]
    pub fn with_transformer_home(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transformer_home = dir.into();
        self
    }

    #[must_use]
    pub fn lib_dir(&self) -> PathBuf {
        self.home.join("lib")
    }

    #[must_use]
    pub fn kind_dir(&self, kind: PluginKind) -> PathBuf {
        match kind {
            PluginKind::Transformer => self.transformer_home.clone(),
            PluginKind::Reader | PluginKind::Writer => self.home.join(kind.as_str()),
        }
    }

    #[must_use]
    pub fn plugin_dir(&self, kind: PluginKind, name: &str) -> PathBuf {
        self.kind_dir(kind).join(name)
    }
}

/// An adapter entry point resolved inside its plugin scope.
#[derive(Debug, Clone)]
pub struct PluginEntry {
    pub descriptor: PluginDescriptor,
    pub scope: Arc<IsolationScope>,
    pub resolved: ResolvedSymbol,
}

/// Loads plugins into isolation scopes and caches them by (kind, name).
pub struct PluginLoader {
    engine: Engine,
    roots: PluginRoots,
    limits: GuestLimits,
    host: Arc<IsolationScope>,
    scopes: Mutex<HashMap<(PluginKind, String), Arc<IsolationScope>>>,
}

impl PluginLoader {
    /// Create a loader and build the host scope from `<home>/lib`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created or a shared archive
    /// fails to compile.
    pub fn new(roots: PluginRoots, limits: GuestLimits) -> Result<Self> {
        let engine = Engine::new(&Config::new())?;
        let lib_dir = roots.lib_dir();
        let host = Arc::new(IsolationScope::host(&engine, Some(&lib_dir))?);
        tracing::debug!(
            home = %roots.home.display(),
            shared_archives = host.archives().len(),
            "Plugin loader ready"
        );
        Ok(Self {
            engine,
            roots,
            limits,
            host,
            scopes: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[must_use]
    pub fn roots(&self) -> &PluginRoots {
        &self.roots
    }

    #[must_use]
    pub fn limits(&self) -> GuestLimits {
        self.limits
    }

    #[must_use]
    pub fn host_scope(&self) -> Arc<IsolationScope> {
        Arc::clone(&self.host)
    }

    /// The cached scope for (kind, name), built on first request.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin directory is missing, empty, fails
    /// checksum verification, or holds an archive that does not compile.
    pub fn scope(&self, kind: PluginKind, name: &str) -> Result<Arc<IsolationScope>> {
        let key = (kind, name.to_string());
        if let Some(scope) = self.scopes.lock().get(&key) {
            return Ok(Arc::clone(scope));
        }

        // Compile without holding the cache lock; a racing loader of the
        // same plugin may finish first, and its scope is the one kept.
        let dir = self.roots.plugin_dir(kind, name);
        let descriptor_path = dir.join(descriptor_file(kind));
        if descriptor_path.is_file() {
            PluginDescriptor::load(&descriptor_path)?.verify_checksums(&dir)?;
        }
        let scope = Arc::new(IsolationScope::open(
            &self.engine,
            kind,
            name,
            &dir,
            Some(Arc::clone(&self.host)),
        )?);
        let mut scopes = self.scopes.lock();
        let cached = scopes.entry(key).or_insert_with(|| {
            tracing::info!(
                kind = %kind,
                plugin = name,
                archives = scope.archives().len(),
                "Loaded plugin scope"
            );
            Arc::clone(&scope)
        });
        Ok(Arc::clone(cached))
    }

    /// Compile in-memory module source into a private, uncached scope whose
    /// parent is the host scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not compile.
    pub fn inline_scope(&self, name: &str, source: &[u8]) -> Result<Arc<IsolationScope>> {
        Ok(Arc::new(IsolationScope::inline(
            &self.engine,
            name,
            source,
            Some(Arc::clone(&self.host)),
        )?))
    }

    /// Read the descriptor of (kind, name).
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is missing or malformed.
    pub fn descriptor(&self, kind: PluginKind, name: &str) -> Result<PluginDescriptor> {
        let path = self.roots.plugin_dir(kind, name).join(descriptor_file(kind));
        PluginDescriptor::load(&path)
    }

    /// Resolve an adapter's job- or task-level entry point: the descriptor's
    /// entry name plus the container suffix, looked up in the plugin scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin cannot be loaded or does not export
    /// the suffixed entry.
    pub fn load_entry(
        &self,
        kind: PluginKind,
        name: &str,
        container: ContainerKind,
    ) -> Result<PluginEntry> {
        let descriptor = self.descriptor(kind, name)?;
        if descriptor.name != name {
            tracing::warn!(
                kind = %kind,
                directory = name,
                declared = descriptor.name.as_str(),
                "Plugin descriptor name differs from its directory"
            );
        }
        let scope = self.scope(kind, name)?;
        let symbol = container.entry_symbol(&descriptor.entry);
        let resolved = scope.resolve(&symbol)?;
        Ok(PluginEntry {
            descriptor,
            scope,
            resolved,
        })
    }

    /// Names of the plugin directories of `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind directory cannot be read.
    pub fn available(&self, kind: PluginKind) -> Result<Vec<String>> {
        list_plugins(&self.roots.kind_dir(kind))
    }

    #[must_use]
    pub fn cached_scopes(&self) -> usize {
        self.scopes.lock().len()
    }

    /// Drop every cached scope.
    pub fn clear_cache(&self) {
        self.scopes.lock().clear();
    }

    #[must_use]
    pub fn transformer_home(&self) -> &Path {
        &self.roots.transformer_home
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("roots", &self.roots)
            .field("limits", &self.limits)
            .field("cached_scopes", &self.cached_scopes())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_layout() {
        let roots = PluginRoots::new("/opt/relay/plugin");
        assert_eq!(
            roots.plugin_dir(PluginKind::Reader, "demo"),
            PathBuf::from("/opt/relay/plugin/reader/demo")
        );
        assert_eq!(
            roots.kind_dir(PluginKind::Transformer),
            PathBuf::from("/opt/relay/plugin/transformer")
        );
        let custom = roots.with_transformer_home("/srv/stages");
        assert_eq!(
            custom.plugin_dir(PluginKind::Transformer, "upper"),
            PathBuf::from("/srv/stages/upper")
        );
        assert_eq!(custom.lib_dir(), PathBuf::from("/opt/relay/plugin/lib"));
    }
}
