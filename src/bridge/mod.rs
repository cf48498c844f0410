//! # Backpressure Stream Bridge
//!
//! Moves response bytes from the blocking thread that runs a pipeline to
//! the async transport, and pushes back on the producer when the client
//! reads slowly.

mod config;
mod errors;
mod stream;

pub use config::BridgeConfig;
pub use errors::{BridgeError, BridgeResult};
pub use stream::{BridgeBody, StreamBridge};
