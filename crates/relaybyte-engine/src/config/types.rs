//! Core configuration types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use relaybyte_runtime::{GuestLimits, PluginRoots};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 2048;
pub const DEFAULT_BYTE_CAPACITY: u64 = 8 * 1024 * 1024;
pub const DEFAULT_FLOW_CONTROL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 600_000;
pub const DEFAULT_BUFFER_SIZE: usize = 32;

/// Parse a byte size such as `"64mb"`, `"512KB"`, `"1g"` or `"4096"`.
/// Units are 1024-based; a bare number is bytes.
///
/// # Errors
///
/// Returns an error for an empty string, an unknown unit or an overflow.
pub fn parse_byte_size(input: &str) -> Result<u64> {
    let trimmed = input.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        bail!("empty byte size");
    }
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid byte size '{input}'"))?;
    let multiplier: u64 = match unit.trim() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024 * 1024,
        "g" | "gb" | "gib" => 1024 * 1024 * 1024,
        other => bail!("unknown byte size unit '{other}' in '{input}'"),
    };
    value
        .checked_mul(multiplier)
        .with_context(|| format!("byte size '{input}' overflows"))
}

/// A byte count written either as a number or as a `"8mb"`-style string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "ByteSizeRepr", into = "u64")]
pub struct ByteSize(u64);

impl ByteSize {
    #[must_use]
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0
    }

    /// The size as `usize`, saturating on 32-bit targets.
    #[must_use]
    pub fn as_usize(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl From<ByteSize> for u64 {
    fn from(size: ByteSize) -> Self {
        size.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ByteSizeRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<ByteSizeRepr> for ByteSize {
    type Error = String;

    fn try_from(repr: ByteSizeRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ByteSizeRepr::Number(n) => Ok(Self(n)),
            ByteSizeRepr::Text(s) => parse_byte_size(&s)
                .map(Self)
                .map_err(|e| format!("{e:#}")),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub channel: ChannelConfig,
    pub exchanger: ExchangerConfig,
    pub plugins: PluginConfig,
    pub errors: ErrorLimitConfig,
    pub dirty: DirtyConfig,
    pub transformers: Vec<TransformerSpec>,
}

/// Channel ceilings, throughput governor and wait bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// Record-count ceiling.
    pub capacity: usize,
    /// Byte ceiling over the estimated in-memory size of queued records.
    pub byte_capacity: ByteSize,
    /// Producer byte-speed ceiling per second.
    pub byte_speed: Option<ByteSize>,
    /// Producer record-speed ceiling per second.
    pub record_speed: Option<u64>,
    pub flow_control_interval_ms: u64,
    /// Upper bound on a single blocked push or pull; `0` waits forever.
    pub wait_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
            byte_capacity: ByteSize::new(DEFAULT_BYTE_CAPACITY),
            byte_speed: None,
            record_speed: None,
            flow_control_interval_ms: DEFAULT_FLOW_CONTROL_INTERVAL_MS,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
        }
    }
}

impl ChannelConfig {
    #[must_use]
    pub fn flow_control_interval(&self) -> Duration {
        Duration::from_millis(self.flow_control_interval_ms)
    }

    #[must_use]
    pub fn wait_timeout(&self) -> Option<Duration> {
        (self.wait_timeout_ms > 0).then(|| Duration::from_millis(self.wait_timeout_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangerConfig {
    /// Records accumulated before an implicit flush, and the pull batch size.
    pub buffer_size: usize,
    /// Column capacity hint for records handed out by `create_record`.
    pub record_columns: usize,
}

impl Default for ExchangerConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            record_columns: relaybyte_types::record::DEFAULT_COLUMN_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    pub home: PathBuf,
    /// Local storage for transform stages; `<home>/transformer` when unset.
    pub transformer_home: Option<PathBuf>,
    /// Linear-memory ceiling per guest instance.
    pub max_memory: Option<ByteSize>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from("plugin"),
            transformer_home: None,
            max_memory: None,
        }
    }
}

impl PluginConfig {
    #[must_use]
    pub fn roots(&self) -> PluginRoots {
        let roots = PluginRoots::new(&self.home);
        match &self.transformer_home {
            Some(dir) => roots.with_transformer_home(dir),
            None => roots,
        }
    }

    #[must_use]
    pub fn limits(&self) -> GuestLimits {
        GuestLimits {
            max_memory_bytes: self.max_memory.map(ByteSize::bytes),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ErrorLimitConfig {
    pub record_limit: Option<u64>,
    /// Fraction in `[0, 1]`.
    pub percentage_limit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirtyConfig {
    pub max_logged: u64,
    pub retain_limit: usize,
}

impl Default for DirtyConfig {
    fn default() -> Self {
        Self {
            max_logged: crate::collector::DEFAULT_MAX_LOGGED,
            retain_limit: crate::collector::DEFAULT_RETAIN_LIMIT,
        }
    }
}

/// One configured transform stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformerSpec {
    pub name: String,
    #[serde(default)]
    pub column_index: Option<usize>,
    #[serde(default)]
    pub params: Vec<String>,
    /// Inline module source for `dx_script`.
    #[serde(default)]
    pub code: Option<String>,
    /// Module source file for `dx_script`; ignored when `code` is set.
    #[serde(default)]
    pub code_file: Option<PathBuf>,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}
