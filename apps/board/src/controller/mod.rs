//! Controller layer: gestures and intents, the startup state machine, and
//! queue orchestration.

pub mod coordinator;
pub mod events;
pub mod orchestration;

pub use coordinator::{Clock, ConnectionState, Coordinator, StartupStep, SystemClock};
