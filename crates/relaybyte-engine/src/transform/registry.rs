//! Registry of named transform stages.
//!
//! Built-in stages carry the reserved `dx_` prefix; stages loaded from the
//! local-storage directory must not. Each external stage is registered with
//! the isolation scope it was loaded into.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use relaybyte_runtime::{IsolationScope, PluginLoader};
use relaybyte_types::PluginKind;

use crate::error::{EngineError, Result};
use crate::transform::builtin;
use crate::transform::wasm::WasmTransformer;
use crate::transform::Transformer;

/// Prefix reserved for built-in stages.
pub const BUILTIN_PREFIX: &str = "dx_";

/// A registered stage.
#[derive(Clone)]
pub struct RegisteredTransformer {
    pub transformer: Arc<dyn Transformer>,
    /// Scope external stages run in; `None` for built-ins.
    pub scope: Option<Arc<IsolationScope>>,
    pub builtin: bool,
}

impl std::fmt::Debug for RegisteredTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTransformer")
            .field("name", &self.transformer.name())
            .field("builtin", &self.builtin)
            .field("scope", &self.scope.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// Name-keyed stage registry.
pub struct TransformerRegistry {
    loader: Arc<PluginLoader>,
    entries: RwLock<HashMap<String, RegisteredTransformer>>,
}

impl TransformerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new(loader: Arc<PluginLoader>) -> Self {
        Self {
            loader,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A registry seeded with every built-in stage.
    ///
    /// # Errors
    ///
    /// Fails only if a built-in is misnamed or registered twice.
    pub fn with_builtins(loader: Arc<PluginLoader>) -> Result<Self> {
        let registry = Self::new(Arc::clone(&loader));
        for transformer in builtin::all(&loader) {
            registry.register_builtin(transformer)?;
        }
        Ok(registry)
    }

    #[must_use]
    pub fn loader(&self) -> &Arc<PluginLoader> {
        &self.loader
    }

    /// Register a built-in stage under its own name.
    ///
    /// # Errors
    ///
    /// Fails when the name lacks the reserved prefix or is taken.
    pub fn register_builtin(&self, transformer: Arc<dyn Transformer>) -> Result<()> {
        let name = transformer.name().to_string();
        if !name.starts_with(BUILTIN_PREFIX) {
            return Err(EngineError::config(format!(
                "built-in transformer '{name}' must start with '{BUILTIN_PREFIX}'"
            )));
        }
        self.insert(
            name,
            RegisteredTransformer {
                transformer,
                scope: None,
                builtin: true,
            },
        )
    }

    /// Register an external stage that runs inside `scope`.
    ///
    /// # Errors
    ///
    /// Fails when the name uses the reserved prefix or is taken.
    pub fn register_external(
        &self,
        name: &str,
        transformer: Arc<dyn Transformer>,
        scope: Option<Arc<IsolationScope>>,
    ) -> Result<()> {
        if name.starts_with(BUILTIN_PREFIX) {
            return Err(EngineError::config(format!(
                "external transformer '{name}' must not start with '{BUILTIN_PREFIX}'"
            )));
        }
        self.insert(
            name.to_string(),
            RegisteredTransformer {
                transformer,
                scope,
                builtin: false,
            },
        )
    }

    fn insert(&self, name: String, entry: RegisteredTransformer) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(EngineError::config(format!(
                "transformer '{name}' is already registered"
            )));
        }
        tracing::debug!(transformer = name.as_str(), builtin = entry.builtin, "Registered transformer");
        entries.insert(name, entry);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<RegisteredTransformer> {
        self.entries.read().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Load and register one external stage from local storage.
    ///
    /// # Errors
    ///
    /// Fails when the descriptor or archives are missing or invalid, the
    /// declared entry is not exported, or the name is not allowed.
    pub fn load_local(&self, name: &str) -> Result<()> {
        let descriptor = self.loader.descriptor(PluginKind::Transformer, name)?;
        if descriptor.name != name {
            tracing::warn!(
                directory = name,
                declared = descriptor.name.as_str(),
                "Transformer descriptor name differs from its directory"
            );
        }
        let scope = self.loader.scope(PluginKind::Transformer, name)?;
        scope.resolve(&descriptor.entry)?;
        let transformer = WasmTransformer::new(name, &descriptor.entry, self.loader.limits());
        self.register_external(name, Arc::new(transformer), Some(scope))?;
        tracing::info!(
            transformer = name,
            entry = descriptor.entry.as_str(),
            "Loaded local transformer"
        );
        Ok(())
    }

    /// Load every stage under the local-storage directory that is not
    /// registered yet. Failures are logged and skipped. Returns the number
    /// of stages loaded.
    pub fn load_local_all(&self) -> usize {
        let available = match self.loader.available(PluginKind::Transformer) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(
                    dir = %self.loader.transformer_home().display(),
                    error = %e,
                    "Failed to list local transformers"
                );
                return 0;
            }
        };
        let mut loaded = 0;
        for name in available {
            if self.contains(&name) {
                continue;
            }
            match self.load_local(&name) {
                Ok(()) => loaded += 1,
                Err(e) => tracing::warn!(
                    transformer = name.as_str(),
                    error = %e,
                    "Skipping local transformer"
                ),
            }
        }
        loaded
    }
}

impl std::fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("names", &self.names())
            .finish_non_exhaustive()
    }
}
