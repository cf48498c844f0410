//! pipequery - a streaming query-pipeline server
//!
//! Pipelines are JSON definitions of a row source plus transform stages.
//! Requests append filter stages from query arguments (`_query`, `_sort`,
//! `_limit`, ...), stream the result through a backpressure bridge and
//! share identical builds through a single-flight response cache.

pub mod bridge;
pub mod cache;
pub mod cli;
pub mod engine;
pub mod expression;
pub mod filters;
pub mod format;
pub mod http_server;
pub mod observability;
pub mod pipeline;
pub mod row;
pub mod sort;
