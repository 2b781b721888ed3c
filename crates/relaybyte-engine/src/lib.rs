//! Record exchange engine: the bounded channel between a source and a sink
//! task, the exchangers adapters talk to, the transform pipeline, and the
//! run statistics that tie tasks and task groups together.

#![warn(clippy::pedantic)]

pub mod collector;
pub mod config;
pub mod error;
pub mod statistics;
pub mod transform;
pub mod transport;

// Re-export public API for convenience
pub use collector::{DirtyRecordCollector, LoggingCollector};
pub use config::{parse_config, validate_config, CoreConfig};
pub use error::{EngineError, Result};
pub use statistics::{Communication, ErrorLimit, TaskGroupRegistry};
pub use transform::{
    build_stages, StageArgs, StageBinding, StageContext, TransformPipeline, Transformer,
    TransformerRegistry,
};
pub use transport::{BufferedExchanger, Channel, DirectExchanger, Exchanger};
