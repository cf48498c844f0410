//! Left-to-right stage composition
//!
//! Each stage hands its output to the rest of the chain, recursing with
//! `split_first_mut` until the final sink is reached.

use std::sync::Arc;

use crate::row::{Row, Schema};

use super::errors::PipelineResult;
use super::spec::StageSpec;
use super::stage::{Stage, StageContext};

/// Whether upstream should keep producing rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Receiver of rows emitted by a stage
pub trait RowSink {
    fn on_row(&mut self, row: Row) -> PipelineResult<Flow>;

    /// True once the execution feeding this sink should stop early
    fn interrupted(&self) -> bool {
        false
    }
}

impl<F> RowSink for F
where
    F: FnMut(Row) -> PipelineResult<Flow>,
{
    fn on_row(&mut self, row: Row) -> PipelineResult<Flow> {
        self(row)
    }
}

/// The stages after the current one, ending in the sink
struct Downstream<'a, 's> {
    stages: &'a mut [Stage],
    sink: &'a mut (dyn RowSink + 's),
}

impl RowSink for Downstream<'_, '_> {
    fn on_row(&mut self, row: Row) -> PipelineResult<Flow> {
        match self.stages.split_first_mut() {
            Some((first, rest)) => {
                let mut next = Downstream {
                    stages: rest,
                    sink: &mut *self.sink,
                };
                first.on_row(row, &mut next)
            }
            None => self.sink.on_row(row),
        }
    }

    fn interrupted(&self) -> bool {
        self.sink.interrupted()
    }
}

/// An ordered list of stage instances with the same start/row/end protocol
/// as a single stage
pub struct Chain {
    stages: Vec<Stage>,
}

impl Chain {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn from_specs<'a>(
        specs: impl IntoIterator<Item = &'a StageSpec>,
        ctx: &StageContext,
    ) -> Self {
        Self::new(specs.into_iter().map(|s| Stage::from_spec(s, ctx)).collect())
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Start every stage in order, returning the schema of the final output
    pub fn on_start(&mut self, schema: Arc<Schema>) -> PipelineResult<Arc<Schema>> {
        self.stages
            .iter_mut()
            .try_fold(schema, |schema, stage| stage.on_start(schema))
    }

    pub fn on_row(&mut self, row: Row, sink: &mut dyn RowSink) -> PipelineResult<Flow> {
        Downstream {
            stages: &mut self.stages,
            sink,
        }
        .on_row(row)
    }

    /// End every stage in order; a stage may emit buffered rows downstream
    pub fn on_end(&mut self, sink: &mut dyn RowSink) -> PipelineResult<()> {
        for idx in 0..self.stages.len() {
            let (head, tail) = self.stages.split_at_mut(idx + 1);
            let mut next = Downstream {
                stages: tail,
                sink: &mut *sink,
            };
            head[idx].on_end(&mut next)?;
        }
        Ok(())
    }
}
