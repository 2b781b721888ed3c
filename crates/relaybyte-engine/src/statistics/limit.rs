//! Dirty-record tolerance checks.

use crate::config::ErrorLimitConfig;
use crate::error::{EngineError, Result};
use crate::statistics::communication::Communication;
use crate::statistics::report::{total_error_records, total_read_records};

/// Job-level tolerance for dirty records. When both limits are configured
/// the record limit is enforced and the percentage limit is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorLimit {
    record_limit: Option<u64>,
    percentage_limit: Option<f64>,
}

impl ErrorLimit {
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the percentage lies outside
    /// `[0, 1]`.
    pub fn new(record_limit: Option<u64>, percentage_limit: Option<f64>) -> Result<Self> {
        if let Some(p) = percentage_limit {
            if !(0.0..=1.0).contains(&p) {
                return Err(EngineError::config(format!(
                    "error percentage limit must be within [0, 1], got {p}"
                )));
            }
        }
        let percentage_limit = if record_limit.is_some() {
            if percentage_limit.is_some() {
                tracing::warn!("Both error limits configured; record limit takes precedence");
            }
            None
        } else {
            percentage_limit
        };
        Ok(Self {
            record_limit,
            percentage_limit,
        })
    }

    /// # Errors
    ///
    /// See [`ErrorLimit::new`].
    pub fn from_config(config: &ErrorLimitConfig) -> Result<Self> {
        Self::new(config.record_limit, config.percentage_limit)
    }

    #[must_use]
    pub fn record_limit(&self) -> Option<u64> {
        self.record_limit
    }

    #[must_use]
    pub fn percentage_limit(&self) -> Option<f64> {
        self.percentage_limit
    }

    /// Run whichever check is configured.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ErrorLimitExceeded`] when the tolerance is
    /// exceeded.
    pub fn check(&self, comm: &Communication) -> Result<()> {
        self.check_record_limit(comm)?;
        self.check_percentage_limit(comm)
    }

    /// # Errors
    ///
    /// Fails when total dirty records exceed the record limit.
    pub fn check_record_limit(&self, comm: &Communication) -> Result<()> {
        let Some(limit) = self.record_limit else {
            return Ok(());
        };
        let errors = u64::try_from(total_error_records(comm)).unwrap_or(0);
        if errors > limit {
            return Err(EngineError::ErrorLimitExceeded(format!(
                "{errors} dirty records exceed the limit of {limit}"
            )));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Fails when records were read and the dirty fraction exceeds the
    /// percentage limit.
    #[allow(clippy::cast_precision_loss)]
    pub fn check_percentage_limit(&self, comm: &Communication) -> Result<()> {
        let Some(limit) = self.percentage_limit else {
            return Ok(());
        };
        let total = total_read_records(comm);
        if total <= 0 {
            return Ok(());
        }
        let ratio = total_error_records(comm) as f64 / total as f64;
        if ratio > limit {
            return Err(EngineError::ErrorLimitExceeded(format!(
                "dirty record ratio {ratio:.4} exceeds the limit of {limit}"
            )));
        }
        Ok(())
    }
}
