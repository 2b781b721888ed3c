//! Adapter-facing record exchange.
//!
//! Source adapters call [`Exchanger::send_to_writer`]; sink adapters call
//! [`Exchanger::get_from_reader`] until it returns `None`.

mod buffered;
mod direct;

pub use buffered::BufferedExchanger;
pub use direct::DirectExchanger;

use relaybyte_types::Record;

use crate::error::Result;

/// The record handoff contract between adapters and the channel.
///
/// After [`Exchanger::shutdown`] every other method fails with
/// [`EngineError::AlreadyShutDown`](crate::error::EngineError::AlreadyShutDown).
pub trait Exchanger: Send {
    /// A fresh, empty record sized for this task's schema.
    ///
    /// # Errors
    ///
    /// Fails after shutdown.
    fn create_record(&self) -> Result<Record>;

    /// Hand a record toward the sink.
    ///
    /// # Errors
    ///
    /// Fails after shutdown or when the channel push fails.
    fn send_to_writer(&mut self, record: Record) -> Result<()>;

    /// The next record for the sink, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Fails after shutdown or when the channel pull fails.
    fn get_from_reader(&mut self) -> Result<Option<Record>>;

    /// Push anything held locally.
    ///
    /// # Errors
    ///
    /// Fails after shutdown or when the channel push fails.
    fn flush(&mut self) -> Result<()>;

    /// Flush and signal end of stream.
    ///
    /// # Errors
    ///
    /// Fails after shutdown or when the channel push fails.
    fn terminate(&mut self) -> Result<()>;

    /// Discard local state, clear the channel and refuse further calls.
    /// Idempotent.
    fn shutdown(&mut self);

    fn is_shut_down(&self) -> bool;
}
