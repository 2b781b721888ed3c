//! Typed column values.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ColumnError, Result};

/// A single typed value inside a [`Record`](crate::Record).
///
/// `Null` stands in for an absent value of any type. Dates are carried as
/// UTC instants and compare as epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Column {
    Null,
    Long(i64),
    Double(f64),
    String(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Date(DateTime<Utc>),
}

impl Column {
    /// Short lowercase name of the column kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Payload size in bytes used for throughput accounting.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Long(_) | Self::Double(_) | Self::Date(_) => 8,
            Self::Bool(_) => 1,
            Self::String(s) => s.len(),
            Self::Bytes(b) => b.len(),
        }
    }

    /// Textual rendering of the value, `None` for `Null`.
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Long(v) => Some(v.to_string()),
            Self::Double(v) => Some(v.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Self::Date(d) => Some(d.to_rfc3339()),
        }
    }

    /// Integer view of the value, `None` for `Null`.
    ///
    /// # Errors
    ///
    /// Returns [`ColumnError::Parse`] when a string does not hold an integer,
    /// and [`ColumnError::Unsupported`] for bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_long(&self) -> Result<Option<i64>> {
        match self {
            Self::Null => Ok(None),
            Self::Long(v) => Ok(Some(*v)),
            Self::Double(v) => Ok(Some(v.trunc() as i64)),
            Self::Bool(b) => Ok(Some(i64::from(*b))),
            Self::Date(d) => Ok(Some(d.timestamp_millis())),
            Self::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ColumnError::Parse {
                    value: s.clone(),
                    to: "long",
                }),
            Self::Bytes(_) => Err(ColumnError::Unsupported {
                from: self.kind(),
                to: "long",
            }),
        }
    }

    /// Floating point view of the value, `None` for `Null`.
    ///
    /// # Errors
    ///
    /// Returns [`ColumnError::Parse`] when a string does not hold a number,
    /// and [`ColumnError::Unsupported`] for bytes and booleans.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_double(&self) -> Result<Option<f64>> {
        match self {
            Self::Null => Ok(None),
            Self::Long(v) => Ok(Some(*v as f64)),
            Self::Double(v) => Ok(Some(*v)),
            Self::Date(d) => Ok(Some(d.timestamp_millis() as f64)),
            Self::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| ColumnError::Parse {
                    value: s.clone(),
                    to: "double",
                }),
            Self::Bool(_) | Self::Bytes(_) => Err(ColumnError::Unsupported {
                from: self.kind(),
                to: "double",
            }),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_string() {
            Some(s) => f.write_str(&s),
            None => f.write_str("null"),
        }
    }
}

impl From<i64> for Column {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for Column {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Column {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Column {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Column {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Column {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Column {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Date(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_sizes_follow_payload() {
        assert_eq!(Column::Null.byte_size(), 0);
        assert_eq!(Column::Long(7).byte_size(), 8);
        assert_eq!(Column::Bool(true).byte_size(), 1);
        assert_eq!(Column::from("héllo").byte_size(), 6);
        assert_eq!(Column::Bytes(vec![1, 2, 3]).byte_size(), 3);
    }

    #[test]
    fn string_parses_as_long() {
        assert_eq!(Column::from(" 42 ").as_long().unwrap(), Some(42));
        assert!(matches!(
            Column::from("abc").as_long(),
            Err(ColumnError::Parse { .. })
        ));
    }

    #[test]
    fn null_has_no_views() {
        assert_eq!(Column::Null.as_long().unwrap(), None);
        assert_eq!(Column::Null.as_double().unwrap(), None);
        assert_eq!(Column::Null.as_string(), None);
    }

    #[test]
    fn date_reads_as_epoch_millis() {
        let d = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(Column::Date(d).as_long().unwrap(), Some(1_700_000_000_123));
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_string(&Column::Long(5)).unwrap();
        assert_eq!(json, r#"{"type":"long","value":5}"#);
        let null = serde_json::to_string(&Column::Null).unwrap();
        assert_eq!(null, r#"{"type":"null"}"#);
    }
}
