//! Plugin discovery, isolation scopes and the WebAssembly guest runtime.
//!
//! Plugins are directories of WebAssembly archives. Each (kind, name) pair
//! gets one [`IsolationScope`] whose symbols resolve against its own archives
//! before falling back to the shared host scope. The [`scope`] module also
//! owns the thread-local "active scope" that foreign stage code resolves
//! through while it runs.

#![warn(clippy::pedantic)]

pub mod descriptor;
pub mod discover;
pub mod error;
pub mod guest;
pub mod limits;
pub mod loader;
pub mod scope;

pub use descriptor::PluginDescriptor;
pub use error::{PluginError, Result};
pub use guest::{GuestInstance, GuestOutcome};
pub use limits::GuestLimits;
pub use loader::{PluginEntry, PluginLoader, PluginRoots};
pub use scope::{IsolationScope, ResolvedSymbol, ScopeGuard};
