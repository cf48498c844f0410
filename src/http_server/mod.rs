//! # HTTP Server Module
//!
//! Axum front end for the query engine.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/metrics` - Counter snapshot as JSON
//! - `/query/*path` - Run a pipeline

pub mod config;
pub mod observability_routes;
pub mod query_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use server::HttpServer;
