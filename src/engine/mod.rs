//! # Query Engine
//!
//! Executes pipeline requests end to end: definition lookup, argument
//! compilation, response caching, admission control and streaming.

mod errors;
mod producer;
mod query_engine;
mod request;

pub use errors::{EngineError, EngineResult};
pub use query_engine::{EngineConfig, QueryEngine};
pub use request::{QueryRequest, QueryResponse};
