//! Record transport between a source task and a sink task.

pub mod channel;
pub mod exchanger;
pub mod governor;

pub use channel::Channel;
pub use exchanger::{BufferedExchanger, DirectExchanger, Exchanger};
pub use governor::{throttle_delay, FlowGovernor};
