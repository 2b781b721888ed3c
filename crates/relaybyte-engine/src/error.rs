//! Engine error model.

use std::time::Duration;

use relaybyte_runtime::PluginError;

/// Errors raised by the transport, transform and statistics layers.
///
/// Per-record problems (oversize records, failing stages) never surface as
/// an `EngineError`; they are diverted to the dirty-record collector and
/// only show up in counters. Everything here aborts the calling task.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid configuration detected at bind or first use. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// An exchanger was used after `shutdown()`.
    #[error("exchanger already shut down")]
    AlreadyShutDown,

    /// A channel push or pull waited longer than the configured timeout.
    #[error("channel {op} timed out after {}ms", waited.as_millis())]
    ChannelTimeout { op: &'static str, waited: Duration },

    /// Push on a closed channel.
    #[error("channel closed")]
    ChannelClosed,

    /// Update of a task group that was never registered.
    #[error("task group {0} is not registered")]
    UnknownTaskGroup(u32),

    /// Dirty records exceeded the configured tolerance.
    #[error("error limit exceeded: {0}")]
    ErrorLimitExceeded(String),

    /// Plugin discovery, loading or guest failure.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Opaque host-side failure.
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl EngineError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the error came from configuration rather than runtime state.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, EngineError>;
