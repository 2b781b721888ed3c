//! Plugin descriptor files.
//!
//! Adapters ship `plugin.json`, locally stored transform stages ship
//! `transformer.json`. Both share one shape:
//!
//! ```json
//! { "name": "upper", "entry": "evaluate", "description": "...",
//!   "checksums": { "upper.wasm": "sha256:..." } }
//! ```

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use relaybyte_types::PluginKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PluginError, Result};

/// Descriptor file name for adapters.
pub const ADAPTER_DESCRIPTOR: &str = "plugin.json";
/// Descriptor file name for locally stored transform stages.
pub const TRANSFORMER_DESCRIPTOR: &str = "transformer.json";

/// Descriptor file name used by plugins of `kind`.
#[must_use]
pub fn descriptor_file(kind: PluginKind) -> &'static str {
    match kind {
        PluginKind::Transformer => TRANSFORMER_DESCRIPTOR,
        PluginKind::Reader | PluginKind::Writer => ADAPTER_DESCRIPTOR,
    }
}

/// Parsed plugin descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Display name; expected to match the plugin directory name.
    pub name: String,
    /// Entry point name. Adapters append `$Job` / `$Task` to it.
    #[serde(alias = "class")]
    pub entry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer: Option<String>,
    /// Expected archive digests keyed by path relative to the plugin
    /// directory, as `sha256:<hex>` or bare hex.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checksums: BTreeMap<String, String>,
}

impl PluginDescriptor {
    /// Read and parse a descriptor file.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Descriptor`] when the file is missing, not JSON,
    /// or names an empty entry point.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PluginError::Descriptor {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let descriptor: Self =
            serde_json::from_str(&content).map_err(|e| PluginError::Descriptor {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if descriptor.entry.trim().is_empty() {
            return Err(PluginError::Descriptor {
                path: path.to_path_buf(),
                reason: "entry must not be empty".into(),
            });
        }
        Ok(descriptor)
    }

    /// Verify every recorded checksum against the archives in `plugin_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ChecksumMismatch`] on the first mismatch,
    /// [`PluginError::Descriptor`] when a key is absolute or climbs out of
    /// `plugin_dir`, or an I/O error when a listed archive cannot be read.
    pub fn verify_checksums(&self, plugin_dir: &Path) -> Result<()> {
        for (relative, expected) in &self.checksums {
            if !stays_inside(Path::new(relative)) {
                return Err(PluginError::Descriptor {
                    path: plugin_dir.to_path_buf(),
                    reason: format!("checksum path '{relative}' escapes the plugin directory"),
                });
            }
            let path: PathBuf = plugin_dir.join(relative);
            let bytes = std::fs::read(&path)?;
            let expected_hex = expected.strip_prefix("sha256:").unwrap_or(expected);
            if sha256_hex(&bytes) != expected_hex.to_ascii_lowercase() {
                return Err(PluginError::ChecksumMismatch {
                    path,
                    expected: expected.clone(),
                });
            }
            tracing::debug!(path = %path.display(), "Archive checksum verified");
        }
        Ok(())
    }
}

/// True when `relative` names something below its base directory.
fn stays_inside(relative: &Path) -> bool {
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_class_alias() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ADAPTER_DESCRIPTOR);
        std::fs::write(&path, r#"{"name":"demo","class":"demo"}"#).unwrap();
        let d = PluginDescriptor::load(&path).unwrap();
        assert_eq!(d.entry, "demo");
        assert!(d.checksums.is_empty());
    }

    #[test]
    fn empty_entry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRANSFORMER_DESCRIPTOR);
        std::fs::write(&path, r#"{"name":"x","entry":" "}"#).unwrap();
        assert!(matches!(
            PluginDescriptor::load(&path),
            Err(PluginError::Descriptor { .. })
        ));
    }

    #[test]
    fn missing_file_is_descriptor_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PluginDescriptor::load(&dir.path().join("plugin.json")).unwrap_err();
        assert!(matches!(err, PluginError::Descriptor { .. }));
    }

    #[test]
    fn checksum_mismatch_detected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.wasm"), b"payload").unwrap();
        let good = PluginDescriptor {
            name: "a".into(),
            entry: "evaluate".into(),
            description: None,
            developer: None,
            checksums: BTreeMap::from([(
                "a.wasm".to_string(),
                format!("sha256:{}", sha256_hex(b"payload")),
            )]),
        };
        good.verify_checksums(dir.path()).unwrap();

        let mut bad = good.clone();
        bad.checksums.insert("a.wasm".into(), "sha256:00".into());
        assert!(matches!(
            bad.verify_checksums(dir.path()),
            Err(PluginError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn checksum_keys_must_stay_in_plugin_dir() {
        let root = tempfile::tempdir().unwrap();
        let plugin_dir = root.path().join("demo");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(root.path().join("outside.wasm"), b"payload").unwrap();
        let digest = format!("sha256:{}", sha256_hex(b"payload"));

        let outside = root.path().join("outside.wasm").display().to_string();
        for key in ["../outside.wasm", "nested/../../outside.wasm", outside.as_str()] {
            let descriptor = PluginDescriptor {
                name: "demo".into(),
                entry: "evaluate".into(),
                description: None,
                developer: None,
                checksums: BTreeMap::from([(key.to_string(), digest.clone())]),
            };
            match descriptor.verify_checksums(&plugin_dir) {
                Err(PluginError::Descriptor { reason, .. }) => {
                    assert!(reason.contains("escapes the plugin directory"), "{key}: {reason}");
                }
                other => panic!("{key}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn dotted_checksum_key_inside_dir_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/a.wasm"), b"payload").unwrap();
        let descriptor = PluginDescriptor {
            name: "a".into(),
            entry: "evaluate".into(),
            description: None,
            developer: None,
            checksums: BTreeMap::from([("./lib/a.wasm".to_string(), sha256_hex(b"payload"))]),
        };
        descriptor.verify_checksums(dir.path()).unwrap();
    }

    #[test]
    fn descriptor_file_per_kind() {
        assert_eq!(descriptor_file(PluginKind::Reader), "plugin.json");
        assert_eq!(descriptor_file(PluginKind::Transformer), "transformer.json");
    }
}
