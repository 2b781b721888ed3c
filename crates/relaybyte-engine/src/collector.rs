//! Dirty-record collection.
//!
//! Records that cannot be delivered (oversize, transform failure, adapter
//! rejection) are handed to a [`DirtyRecordCollector`] instead of aborting
//! the task. The logging collector counts them into the task's
//! communication, logs the first few in full, and keeps a bounded copy for
//! later draining.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use relaybyte_types::dirty::DirtyRecord;
use relaybyte_types::{PluginKind, Record};

use crate::config::DirtyConfig;
use crate::statistics::communication::Communication;
use crate::statistics::report::keys;

/// Default number of dirty records logged in full.
pub const DEFAULT_MAX_LOGGED: u64 = 128;
/// Default number of dirty records retained for draining.
pub const DEFAULT_RETAIN_LIMIT: usize = 10_000;

/// Sink for records diverted away from the writer.
pub trait DirtyRecordCollector: Send + Sync {
    /// Divert `record` with a human-readable reason.
    fn collect_dirty_record(&self, record: &Record, message: &str);

    /// Divert `record` because of `error`.
    fn collect_dirty_error(&self, record: &Record, error: &anyhow::Error, message: &str) {
        let _ = error;
        self.collect_dirty_record(record, message);
    }

    /// Attach a free-form message to the task's communication.
    fn collect_message(&self, key: &str, value: &str);
}

/// Collector that records into a [`Communication`] and the log.
pub struct LoggingCollector {
    kind: PluginKind,
    communication: Arc<Communication>,
    max_logged: u64,
    logged: AtomicU64,
    retain_limit: usize,
    retained: Mutex<Vec<DirtyRecord>>,
}

impl LoggingCollector {
    #[must_use]
    pub fn new(kind: PluginKind, communication: Arc<Communication>) -> Self {
        Self {
            kind,
            communication,
            max_logged: DEFAULT_MAX_LOGGED,
            logged: AtomicU64::new(0),
            retain_limit: DEFAULT_RETAIN_LIMIT,
            retained: Mutex::new(Vec::new()),
        }
    }

    /// A collector using the configured log and retention caps.
    #[must_use]
    pub fn from_config(
        kind: PluginKind,
        communication: Arc<Communication>,
        config: &DirtyConfig,
    ) -> Self {
        Self::new(kind, communication)
            .with_max_logged(config.max_logged)
            .with_retain_limit(config.retain_limit)
    }

    #[must_use]
    pub fn with_max_logged(mut self, max_logged: u64) -> Self {
        self.max_logged = max_logged;
        self
    }

    #[must_use]
    pub fn with_retain_limit(mut self, retain_limit: usize) -> Self {
        self.retain_limit = retain_limit;
        self
    }

    /// Number of dirty records currently retained.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.retained.lock().len()
    }

    /// Take every retained dirty record.
    pub fn drain(&self) -> Vec<DirtyRecord> {
        std::mem::take(&mut *self.retained.lock())
    }

    fn record(&self, dirty: DirtyRecord, byte_size: usize) {
        let (records_key, bytes_key) = match self.kind {
            PluginKind::Writer => (keys::WRITE_FAILED_RECORDS, keys::WRITE_FAILED_BYTES),
            PluginKind::Reader | PluginKind::Transformer => {
                (keys::READ_FAILED_RECORDS, keys::READ_FAILED_BYTES)
            }
        };
        self.communication.increase_counter(records_key, 1);
        self.communication
            .increase_counter(bytes_key, i64::try_from(byte_size).unwrap_or(i64::MAX));

        if self.logged.fetch_add(1, Ordering::Relaxed) < self.max_logged {
            match serde_json::to_string(&dirty) {
                Ok(json) => tracing::error!(kind = %self.kind, "Dirty record: {json}"),
                Err(e) => tracing::error!(
                    kind = %self.kind,
                    message = dirty.message.as_str(),
                    error = %e,
                    "Dirty record (unserializable)"
                ),
            }
        }

        let mut retained = self.retained.lock();
        if retained.len() >= self.retain_limit {
            tracing::debug!(
                max = self.retain_limit,
                "Dirty record cap reached; dropping retained copy"
            );
            return;
        }
        retained.push(dirty);
    }
}

impl DirtyRecordCollector for LoggingCollector {
    fn collect_dirty_record(&self, record: &Record, message: &str) {
        self.record(
            DirtyRecord::new(self.kind, record, message),
            record.byte_size(),
        );
    }

    fn collect_dirty_error(&self, record: &Record, error: &anyhow::Error, message: &str) {
        self.record(
            DirtyRecord::new(self.kind, record, message).with_exception(format!("{error:#}")),
            record.byte_size(),
        );
    }

    fn collect_message(&self, key: &str, value: &str) {
        self.communication.add_message(key, value);
    }
}

impl std::fmt::Debug for LoggingCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingCollector")
            .field("kind", &self.kind)
            .field("max_logged", &self.max_logged)
            .field("retain_limit", &self.retain_limit)
            .finish_non_exhaustive()
    }
}
