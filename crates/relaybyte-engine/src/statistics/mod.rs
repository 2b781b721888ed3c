//! Run statistics: per-task communications, derived reports, task-group
//! aggregation and error tolerances.

pub mod communication;
pub mod limit;
pub mod registry;
pub mod report;

pub use communication::{Cause, Communication, CounterValue};
pub use limit::ErrorLimit;
pub use registry::TaskGroupRegistry;
pub use report::{build_report, keys, snapshot_line};
