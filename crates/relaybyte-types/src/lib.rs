//! Shared data types for the relaybyte record engine.
//!
//! Everything here is plain data: records and their columns, the channel
//! frame that carries end-of-stream, task run states, plugin kinds and the
//! dirty-record envelope. No I/O or locking lives in this crate.

#![warn(clippy::pedantic)]

pub mod column;
pub mod dirty;
pub mod error;
pub mod plugin;
pub mod record;
pub mod state;

pub use column::Column;
pub use error::ColumnError;
pub use plugin::{ContainerKind, PluginKind};
pub use record::{Frame, Record};
pub use state::RunState;
