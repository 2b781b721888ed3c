//! Plugin runtime error types.

use std::path::PathBuf;

use relaybyte_types::PluginKind;

/// Errors from plugin discovery, loading and guest execution.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Wasmtime engine, compilation or trap error.
    #[error("wasmtime: {0:#}")]
    Wasmtime(#[from] anyhow::Error),

    /// I/O error while walking plugin directories or reading archives.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The plugin directory does not exist.
    #[error("{kind} plugin '{name}' not found at {}", path.display())]
    NotFound {
        kind: PluginKind,
        name: String,
        path: PathBuf,
    },

    /// The plugin directory holds no code archive.
    #[error("{kind} plugin '{name}' has no archives under {}", path.display())]
    NoArchives {
        kind: PluginKind,
        name: String,
        path: PathBuf,
    },

    /// Descriptor file missing or malformed.
    #[error("invalid plugin descriptor {}: {reason}", path.display())]
    Descriptor { path: PathBuf, reason: String },

    /// Archive content does not match the checksum recorded in the descriptor.
    #[error("checksum mismatch for {}: expected {expected}", path.display())]
    ChecksumMismatch { path: PathBuf, expected: String },

    /// A symbol could not be resolved through a scope chain.
    #[error("symbol '{symbol}' not found in scope '{scope}'")]
    SymbolNotFound { scope: String, symbol: String },

    /// Stage code ran on a thread with no active plugin scope.
    #[error("no active plugin scope on this thread")]
    NoActiveScope,

    /// The guest broke the calling convention.
    #[error("guest protocol: {0}")]
    Protocol(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = PluginError::from(io_err);
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn not_found_names_kind_and_path() {
        let err = PluginError::NotFound {
            kind: PluginKind::Reader,
            name: "mysqlreader".into(),
            path: PathBuf::from("/plugins/reader/mysqlreader"),
        };
        let msg = err.to_string();
        assert!(msg.contains("reader plugin 'mysqlreader'"));
        assert!(msg.contains("/plugins/reader/mysqlreader"));
    }
}
