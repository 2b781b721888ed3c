//! Isolation scopes and the thread-local active scope.
//!
//! An [`IsolationScope`] is the set of compiled archives belonging to one
//! plugin, indexed by exported function name. Lookups try the scope's own
//! archives first and then walk the parent chain, which ends at the host
//! scope holding the engine's shared library archives. Two plugins exporting
//! the same symbol never see each other's definition.
//!
//! Each thread has at most one *active* scope. [`ScopeGuard`] installs a
//! scope and restores the previous one when dropped, on every exit path.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use relaybyte_types::PluginKind;
use wasmtime::{Engine, ExternType, Module};

use crate::discover::collect_archives;
use crate::error::{PluginError, Result};

/// Name of the root scope that owns the engine's shared archives.
pub const HOST_SCOPE_NAME: &str = "host";

/// One compiled archive inside a scope.
#[derive(Clone)]
pub struct Archive {
    pub path: PathBuf,
    pub module: Module,
}

/// A symbol resolved through a scope chain.
#[derive(Clone)]
pub struct ResolvedSymbol {
    /// Name of the scope that owns the defining archive.
    pub scope_name: String,
    pub symbol: String,
    pub archive: PathBuf,
    pub module: Module,
}

impl fmt::Debug for ResolvedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSymbol")
            .field("scope_name", &self.scope_name)
            .field("symbol", &self.symbol)
            .field("archive", &self.archive)
            .finish_non_exhaustive()
    }
}

/// Isolated symbol namespace of one plugin.
pub struct IsolationScope {
    name: String,
    kind: Option<PluginKind>,
    root: Option<PathBuf>,
    engine: Engine,
    archives: Vec<Archive>,
    symbols: HashMap<String, usize>,
    parent: Option<Arc<IsolationScope>>,
}

impl IsolationScope {
    /// Build the host scope from the shared library directory. A missing
    /// directory yields an empty scope.
    ///
    /// # Errors
    ///
    /// Returns an error if an archive fails to compile.
    pub fn host(engine: &Engine, lib_dir: Option<&Path>) -> Result<Self> {
        let paths = match lib_dir {
            Some(dir) if dir.is_dir() => collect_archives(dir)?,
            _ => Vec::new(),
        };
        Self::build(
            engine,
            HOST_SCOPE_NAME.to_string(),
            None,
            lib_dir.map(Path::to_path_buf),
            &paths,
            None,
        )
    }

    /// Build a scope over every archive under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] when `dir` does not exist,
    /// [`PluginError::NoArchives`] when it holds no archive, or a compile
    /// error for a malformed archive.
    pub fn open(
        engine: &Engine,
        kind: PluginKind,
        name: &str,
        dir: &Path,
        parent: Option<Arc<IsolationScope>>,
    ) -> Result<Self> {
        if !dir.is_dir() {
            return Err(PluginError::NotFound {
                kind,
                name: name.to_string(),
                path: dir.to_path_buf(),
            });
        }
        let paths = collect_archives(dir)?;
        if paths.is_empty() {
            return Err(PluginError::NoArchives {
                kind,
                name: name.to_string(),
                path: dir.to_path_buf(),
            });
        }
        Self::build(
            engine,
            name.to_string(),
            Some(kind),
            Some(dir.to_path_buf()),
            &paths,
            parent,
        )
    }

    /// Build a single-archive scope from in-memory source (binary or text
    /// format).
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not compile.
    pub fn inline(
        engine: &Engine,
        name: &str,
        source: &[u8],
        parent: Option<Arc<IsolationScope>>,
    ) -> Result<Self> {
        let module = Module::new(engine, source)
            .with_context(|| format!("Failed to compile inline module '{name}'"))?;
        let archive = Archive {
            path: PathBuf::from(format!("<inline:{name}>")),
            module,
        };
        Ok(Self::from_archives(
            engine,
            name.to_string(),
            None,
            None,
            vec![archive],
            parent,
        ))
    }

    fn build(
        engine: &Engine,
        name: String,
        kind: Option<PluginKind>,
        root: Option<PathBuf>,
        paths: &[PathBuf],
        parent: Option<Arc<IsolationScope>>,
    ) -> Result<Self> {
        let mut archives = Vec::with_capacity(paths.len());
        for path in paths {
            let module = Module::from_file(engine, path)
                .with_context(|| format!("Failed to compile archive: {}", path.display()))?;
            archives.push(Archive {
                path: path.clone(),
                module,
            });
        }
        Ok(Self::from_archives(engine, name, kind, root, archives, parent))
    }

    fn from_archives(
        engine: &Engine,
        name: String,
        kind: Option<PluginKind>,
        root: Option<PathBuf>,
        archives: Vec<Archive>,
        parent: Option<Arc<IsolationScope>>,
    ) -> Self {
        let mut symbols: HashMap<String, usize> = HashMap::new();
        for (idx, archive) in archives.iter().enumerate() {
            for export in archive.module.exports() {
                if !matches!(export.ty(), ExternType::Func(_)) {
                    continue;
                }
                if let Some(&first) = symbols.get(export.name()) {
                    tracing::debug!(
                        scope = name.as_str(),
                        symbol = export.name(),
                        kept = %archives[first].path.display(),
                        shadowed = %archive.path.display(),
                        "Duplicate export inside scope"
                    );
                    continue;
                }
                symbols.insert(export.name().to_string(), idx);
            }
        }
        tracing::debug!(
            scope = name.as_str(),
            archives = archives.len(),
            symbols = symbols.len(),
            "Built isolation scope"
        );
        Self {
            name,
            kind,
            root,
            engine: engine.clone(),
            archives,
            symbols,
            parent,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plugin kind, `None` for the host scope and inline scopes.
    #[must_use]
    pub fn kind(&self) -> Option<PluginKind> {
        self.kind
    }

    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[must_use]
    pub fn archives(&self) -> &[Archive] {
        &self.archives
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Arc<IsolationScope>> {
        self.parent.as_ref()
    }

    /// Whether this scope itself (not its parents) exports `symbol`.
    #[must_use]
    pub fn defines(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    /// Exported function names defined directly in this scope, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve `symbol`, own archives first, then the parent chain.
    #[must_use]
    pub fn lookup(&self, symbol: &str) -> Option<ResolvedSymbol> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(&idx) = current.symbols.get(symbol) {
                let archive = &current.archives[idx];
                return Some(ResolvedSymbol {
                    scope_name: current.name.clone(),
                    symbol: symbol.to_string(),
                    archive: archive.path.clone(),
                    module: archive.module.clone(),
                });
            }
            scope = current.parent.as_deref();
        }
        None
    }

    /// Like [`lookup`](Self::lookup) but fails when nothing resolves.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SymbolNotFound`].
    pub fn resolve(&self, symbol: &str) -> Result<ResolvedSymbol> {
        self.lookup(symbol).ok_or_else(|| PluginError::SymbolNotFound {
            scope: self.name.clone(),
            symbol: symbol.to_string(),
        })
    }
}

impl fmt::Debug for IsolationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationScope")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("archives", &self.archives.len())
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .finish_non_exhaustive()
    }
}

// ── Thread-local active scope ───────────────────────────────────────

thread_local! {
    static ACTIVE_SCOPE: RefCell<Option<Arc<IsolationScope>>> = const { RefCell::new(None) };
}

/// The calling thread's active scope.
#[must_use]
pub fn current() -> Option<Arc<IsolationScope>> {
    ACTIVE_SCOPE.with(|cell| cell.borrow().clone())
}

/// Resolve `symbol` through the calling thread's active scope.
///
/// # Errors
///
/// Returns [`PluginError::NoActiveScope`] when no scope is installed, or
/// [`PluginError::SymbolNotFound`].
pub fn resolve_current(symbol: &str) -> Result<ResolvedSymbol> {
    current().ok_or(PluginError::NoActiveScope)?.resolve(symbol)
}

/// Installs a scope as the thread's active scope until dropped, then puts
/// back whatever was active before.
///
/// The guard is deliberately `!Send`: it must be dropped on the thread that
/// created it.
#[must_use = "the previous scope is restored as soon as the guard is dropped"]
pub struct ScopeGuard {
    previous: Option<Arc<IsolationScope>>,
    _not_send: PhantomData<*const ()>,
}

impl ScopeGuard {
    pub fn enter(scope: Arc<IsolationScope>) -> Self {
        let previous = ACTIVE_SCOPE.with(|cell| cell.borrow_mut().replace(scope));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_SCOPE.with(|cell| *cell.borrow_mut() = previous);
    }
}

/// Run `f` with `scope` active on the calling thread.
pub fn with_scope<R>(scope: &Arc<IsolationScope>, f: impl FnOnce() -> R) -> R {
    let _guard = ScopeGuard::enter(Arc::clone(scope));
    f()
}
