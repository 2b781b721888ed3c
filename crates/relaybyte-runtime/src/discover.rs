//! Archive and plugin directory discovery.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

/// File extensions recognised as code archives.
pub const ARCHIVE_EXTENSIONS: [&str; 2] = ["wasm", "wat"];

/// Whether `path` looks like a code archive.
#[must_use]
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ARCHIVE_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)))
}

/// Recursively collect every archive under `dir`, nested subdirectories
/// included. Results are sorted by path.
///
/// # Errors
///
/// Returns an error if a directory cannot be read.
pub fn collect_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archives = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && is_archive(entry.path()) {
            archives.push(entry.into_path());
        }
    }
    archives.sort();
    Ok(archives)
}

/// Names of the plugin directories directly under `root`. A missing root
/// yields an empty list.
///
/// # Errors
///
/// Returns an error if `root` exists but cannot be read.
pub fn list_plugins(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"(module)").unwrap();
    }

    #[test]
    fn collects_nested_archives_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.wasm"));
        touch(&dir.path().join("libs/deep/b.wasm"));
        touch(&dir.path().join("libs/c.wat"));
        touch(&dir.path().join("plugin.json"));

        let found = collect_archives(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.wasm", "libs/c.wat", "libs/deep/b.wasm"]);
    }

    #[test]
    fn list_plugins_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_plugins(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn list_plugins_returns_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zeta")).unwrap();
        std::fs::create_dir(dir.path().join("alpha")).unwrap();
        std::fs::write(dir.path().join("README"), b"x").unwrap();
        assert_eq!(list_plugins(dir.path()).unwrap(), vec!["alpha", "zeta"]);
    }
}
