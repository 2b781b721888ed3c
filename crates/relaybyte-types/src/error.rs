//! Column conversion errors.

/// Errors raised when a column value cannot be read as the requested type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColumnError {
    /// The column holds a value of a kind that has no such conversion.
    #[error("cannot convert {from} column to {to}")]
    Unsupported {
        /// Kind of the source column.
        from: &'static str,
        /// Requested target kind.
        to: &'static str,
    },

    /// A textual value failed to parse as the requested type.
    #[error("cannot parse '{value}' as {to}")]
    Parse {
        /// Offending text.
        value: String,
        /// Requested target kind.
        to: &'static str,
    },
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ColumnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_value_and_target() {
        let err = ColumnError::Parse {
            value: "abc".into(),
            to: "long",
        };
        assert_eq!(err.to_string(), "cannot parse 'abc' as long");
    }
}
