// queue-client: Queue status synchronization client.
// Exposes modules for integration testing.

pub mod alerts;
pub mod api;
pub mod clock;
pub mod config;
pub mod control_api;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod notification;
pub mod push_bridge;
pub mod scheduler;
pub mod sink;

pub use engine::{Engine, EngineHandle, EngineState};
pub use error::ClientError;
