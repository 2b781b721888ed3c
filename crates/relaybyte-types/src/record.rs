//! Records and the channel frame that carries them.

use serde::{Deserialize, Serialize};

use crate::column::Column;

/// Estimated fixed overhead of a record object, in bytes.
pub const RECORD_HEAD_BYTES: usize = 80;
/// Estimated fixed overhead of each column slot, in bytes.
pub const COLUMN_HEAD_BYTES: usize = 24;
/// Column capacity reserved by [`Record::new`].
pub const DEFAULT_COLUMN_CAPACITY: usize = 16;

/// Ordered sequence of typed columns moving from a source to a sink.
///
/// The payload byte size is tracked incrementally so capacity accounting in
/// the channel never walks the columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Column>", into = "Vec<Column>")]
pub struct Record {
    columns: Vec<Column>,
    byte_size: usize,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_COLUMN_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(columns: usize) -> Self {
        Self {
            columns: Vec::with_capacity(columns),
            byte_size: 0,
        }
    }

    /// Build a record from a column list.
    #[must_use]
    pub fn from_columns(columns: Vec<Column>) -> Self {
        let byte_size = columns.iter().map(Column::byte_size).sum();
        Self { columns, byte_size }
    }

    /// Append a column.
    pub fn add_column(&mut self, column: impl Into<Column>) {
        let column = column.into();
        self.byte_size += column.byte_size();
        self.columns.push(column);
    }

    /// Replace the column at `index`, growing the record with `Null`
    /// columns when the index lies past the end.
    pub fn set_column(&mut self, index: usize, column: impl Into<Column>) {
        let column = column.into();
        if index >= self.columns.len() {
            self.columns.resize(index + 1, Column::Null);
        }
        self.byte_size -= self.columns[index].byte_size();
        self.byte_size += column.byte_size();
        self.columns[index] = column;
    }

    #[must_use]
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Sum of the column payload sizes.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Estimated in-memory footprint including per-object overhead.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        RECORD_HEAD_BYTES + self.columns.len() * COLUMN_HEAD_BYTES + self.byte_size
    }

    #[must_use]
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Column>> for Record {
    fn from(columns: Vec<Column>) -> Self {
        Self::from_columns(columns)
    }
}

impl From<Record> for Vec<Column> {
    fn from(record: Record) -> Self {
        record.columns
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.columns),
        }
    }
}

/// Item carried by a channel: a record or the end-of-stream marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Record(Record),
    Terminate,
}

impl Frame {
    /// Payload size used for throughput accounting.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Record(r) => r.byte_size(),
            Self::Terminate => 0,
        }
    }

    /// Estimated memory footprint used for capacity accounting.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        match self {
            Self::Record(r) => r.memory_size(),
            Self::Terminate => 0,
        }
    }

    #[must_use]
    pub fn is_terminate(&self) -> bool {
        matches!(self, Self::Terminate)
    }

    /// Unwrap the record, `None` for the end-of-stream marker.
    #[must_use]
    pub fn into_record(self) -> Option<Record> {
        match self {
            Self::Record(r) => Some(r),
            Self::Terminate => None,
        }
    }
}

impl From<Record> for Frame {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}
