//! Dirty-record envelope.
//!
//! A [`DirtyRecord`] captures a record that was diverted away from the
//! writer (oversize, transform failure, adapter rejection) together with the
//! reason, for logging and later inspection.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::plugin::PluginKind;
use crate::record::Record;

/// RFC 3339 timestamp string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    #[must_use]
    pub fn new(rfc3339: impl Into<String>) -> Self {
        Self(rfc3339.into())
    }

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record diverted to the dirty-record collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirtyRecord {
    /// Side of the task that rejected the record.
    #[serde(rename = "type")]
    pub kind: PluginKind,
    /// Human-readable reason.
    pub message: String,
    /// Rendered error chain, when the rejection came from an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// Record content at the time of rejection.
    pub record: Vec<Column>,
    pub failed_at: Timestamp,
}

impl DirtyRecord {
    #[must_use]
    pub fn new(kind: PluginKind, record: &Record, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exception: None,
            record: record.columns().to_vec(),
            failed_at: Timestamp::now(),
        }
    }

    #[must_use]
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }
}
