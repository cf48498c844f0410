//! # Transform Pipeline
//!
//! Pipeline definitions, stage specifications and the stage instances that
//! stream rows from a source to a sink.
//!
//! ```text
//! RowSource ─▶ Stage ─▶ Stage ─▶ ... ─▶ RowSink
//!              on_start / on_row / on_end
//! ```
//!
//! A stage returning [`Flow::Stop`] asks upstream to stop producing, which
//! lets a limit end source reads early.

mod chain;
mod definition;
mod errors;
mod source;
mod spec;
mod stage;

pub use chain::{Chain, Flow, RowSink};
pub use definition::{DefinitionStore, PipelineDefinition};
pub use errors::{PipelineError, PipelineResult};
pub use source::{DefaultSourceFactory, RowSource, SourceFactory, SourceSpec, StaticSource, TestSource};
pub use spec::{FieldMapping, FilterExpression, StageSpec};
pub use stage::{Stage, StageContext};
