//! Stage instances
//!
//! A closed set of request-scoped, stateful stages built from
//! [`StageSpec`]s. Every stage follows the same protocol:
//!
//! - `on_start(schema)` validates its configuration and returns the output schema
//! - `on_row(row, next)` emits zero or more rows into `next`
//! - `on_end(next)` flushes anything buffered

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::observability::MetricsRegistry;
use crate::row::{Field, Row, Schema};
use crate::sort::{ExternalSorter, SortConfig, SortKey};

use super::chain::{Flow, RowSink};
use super::errors::{PipelineError, PipelineResult};
use super::spec::{FieldMapping, FilterExpression, StageSpec};

/// Execution-wide settings shared by stage instances
#[derive(Debug, Clone, Default)]
pub struct StageContext {
    pub sort: SortConfig,
    pub metrics: Option<Arc<MetricsRegistry>>,
}

pub enum Stage {
    Map(Projection),
    Relabel(Projection),
    FieldRemoval(Projection),
    Filter(FilterStage),
    Offset(OffsetStage),
    Limit(LimitStage),
    Sort(SortStage),
}

impl Stage {
    pub fn from_spec(spec: &StageSpec, ctx: &StageContext) -> Self {
        match spec {
            StageSpec::Map { mappings } => Stage::Map(Projection::rename(mappings)),
            StageSpec::Relabel { mappings } => Stage::Relabel(Projection::rename(mappings)),
            StageSpec::FieldRemoval { fields } => Stage::FieldRemoval(Projection::remove(fields)),
            StageSpec::Filter { expression } => Stage::Filter(FilterStage::new(expression.clone())),
            StageSpec::Offset { count } => Stage::Offset(OffsetStage::new(*count)),
            StageSpec::Limit { count } => Stage::Limit(LimitStage::new(*count)),
            StageSpec::Sort { keys } => Stage::Sort(SortStage::new(keys.clone(), ctx)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Map(_) => "map",
            Stage::Relabel(_) => "relabel",
            Stage::FieldRemoval(_) => "field_removal",
            Stage::Filter(_) => "filter",
            Stage::Offset(_) => "offset",
            Stage::Limit(_) => "limit",
            Stage::Sort(_) => "sort",
        }
    }

    pub fn on_start(&mut self, schema: Arc<Schema>) -> PipelineResult<Arc<Schema>> {
        match self {
            Stage::Map(p) | Stage::Relabel(p) | Stage::FieldRemoval(p) => Ok(p.on_start(schema)),
            Stage::Filter(s) => s.on_start(schema),
            Stage::Offset(_) | Stage::Limit(_) => Ok(schema),
            Stage::Sort(s) => s.on_start(schema),
        }
    }

    pub fn on_row(&mut self, row: Row, next: &mut dyn RowSink) -> PipelineResult<Flow> {
        match self {
            Stage::Map(p) | Stage::Relabel(p) | Stage::FieldRemoval(p) => {
                next.on_row(p.apply(row))
            }
            Stage::Filter(s) => s.on_row(row, next),
            Stage::Offset(s) => s.on_row(row, next),
            Stage::Limit(s) => s.on_row(row, next),
            Stage::Sort(s) => s.on_row(row),
        }
    }

    pub fn on_end(&mut self, next: &mut dyn RowSink) -> PipelineResult<()> {
        match self {
            Stage::Sort(s) => s.on_end(next),
            _ => Ok(()),
        }
    }
}

enum ProjectionRules {
    Rename(HashMap<String, String>),
    Remove(HashSet<String>),
}

/// Renames or drops fields; shared by map, relabel and field removal
pub struct Projection {
    rules: ProjectionRules,
    output: Option<Arc<Schema>>,
    keep: Vec<bool>,
}

impl Projection {
    fn rename(mappings: &[FieldMapping]) -> Self {
        let rules = mappings
            .iter()
            .map(|m| (m.source.clone(), m.target.clone()))
            .collect();
        Self::with_rules(ProjectionRules::Rename(rules))
    }

    fn remove(fields: &[String]) -> Self {
        Self::with_rules(ProjectionRules::Remove(fields.iter().cloned().collect()))
    }

    fn with_rules(rules: ProjectionRules) -> Self {
        Self {
            rules,
            output: None,
            keep: Vec::new(),
        }
    }

    fn on_start(&mut self, schema: Arc<Schema>) -> Arc<Schema> {
        let mut fields = Vec::with_capacity(schema.len());
        self.keep = schema
            .fields()
            .iter()
            .map(|field| {
                let target = match &self.rules {
                    ProjectionRules::Rename(rules) => match rules.get(&field.name) {
                        Some(target) if target.is_empty() => None,
                        Some(target) => Some(target.clone()),
                        None => Some(field.name.clone()),
                    },
                    ProjectionRules::Remove(names) => {
                        (!names.contains(&field.name)).then(|| field.name.clone())
                    }
                };
                match target {
                    Some(name) => {
                        fields.push(Field::new(name, field.data_type));
                        true
                    }
                    None => false,
                }
            })
            .collect();

        let unchanged = fields.len() == schema.len()
            && fields
                .iter()
                .zip(schema.fields())
                .all(|(a, b)| a.name == b.name);
        let output = if unchanged {
            schema
        } else {
            Arc::new(Schema::new(fields))
        };
        self.output = Some(Arc::clone(&output));
        output
    }

    fn apply(&self, row: Row) -> Row {
        let Some(output) = &self.output else {
            return row;
        };
        if Arc::ptr_eq(output, row.schema()) {
            return row;
        }
        let values = row
            .into_values()
            .into_iter()
            .zip(self.keep.iter().chain(std::iter::repeat(&false)))
            .filter_map(|(value, keep)| keep.then_some(value))
            .collect();
        Row::new(Arc::clone(output), values)
    }
}

pub struct FilterStage {
    expression: FilterExpression,
}

impl FilterStage {
    fn new(expression: FilterExpression) -> Self {
        Self { expression }
    }

    fn on_start(&mut self, schema: Arc<Schema>) -> PipelineResult<Arc<Schema>> {
        if let Some(missing) = self
            .expression
            .expr()
            .fields()
            .into_iter()
            .find(|f| !schema.contains(f))
        {
            return Err(PipelineError::UnknownField(missing.to_string()));
        }
        Ok(schema)
    }

    fn on_row(&mut self, row: Row, next: &mut dyn RowSink) -> PipelineResult<Flow> {
        if self.expression.expr().evaluate(&row) {
            next.on_row(row)
        } else {
            Ok(Flow::Continue)
        }
    }
}

pub struct OffsetStage {
    count: u64,
    skipped: u64,
}

impl OffsetStage {
    fn new(count: u64) -> Self {
        Self { count, skipped: 0 }
    }

    fn on_row(&mut self, row: Row, next: &mut dyn RowSink) -> PipelineResult<Flow> {
        if self.skipped < self.count {
            self.skipped += 1;
            return Ok(Flow::Continue);
        }
        next.on_row(row)
    }
}

pub struct LimitStage {
    count: u64,
    emitted: u64,
}

impl LimitStage {
    fn new(count: u64) -> Self {
        Self { count, emitted: 0 }
    }

    fn on_row(&mut self, row: Row, next: &mut dyn RowSink) -> PipelineResult<Flow> {
        if self.emitted >= self.count {
            return Ok(Flow::Stop);
        }
        self.emitted += 1;
        let flow = next.on_row(row)?;
        if self.emitted >= self.count {
            Ok(Flow::Stop)
        } else {
            Ok(flow)
        }
    }
}

pub struct SortStage {
    keys: Vec<SortKey>,
    config: SortConfig,
    metrics: Option<Arc<MetricsRegistry>>,
    sorter: Option<ExternalSorter>,
}

impl SortStage {
    fn new(keys: Vec<SortKey>, ctx: &StageContext) -> Self {
        Self {
            keys,
            config: ctx.sort.clone(),
            metrics: ctx.metrics.clone(),
            sorter: None,
        }
    }

    fn on_start(&mut self, schema: Arc<Schema>) -> PipelineResult<Arc<Schema>> {
        self.sorter = Some(ExternalSorter::new(Arc::clone(&schema), &self.keys, &self.config)?);
        Ok(schema)
    }

    fn on_row(&mut self, row: Row) -> PipelineResult<Flow> {
        if let Some(sorter) = self.sorter.as_mut() {
            sorter.push(row)?;
        }
        Ok(Flow::Continue)
    }

    fn on_end(&mut self, next: &mut dyn RowSink) -> PipelineResult<()> {
        let Some(sorter) = self.sorter.take() else {
            return Ok(());
        };
        if let Some(metrics) = &self.metrics {
            metrics.add_sort_spills(sorter.spills() as u64);
        }
        for row in sorter.finish()? {
            if next.interrupted() {
                return Err(PipelineError::Cancelled);
            }
            if next.on_row(row?)? == Flow::Stop {
                break;
            }
        }
        Ok(())
    }
}
