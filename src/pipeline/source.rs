//! Row sources
//!
//! A source is opened once, polled with `has_next`/`next_row`, and closed
//! on every exit path. `close` must be idempotent.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::vec;

use serde::{Deserialize, Serialize};

use crate::row::{DataType, Field, Row, Schema, Value};

use super::errors::{PipelineError, PipelineResult};

/// Lazy, pull-based supplier of rows
pub trait RowSource: Send {
    /// Open the source and declare its schema
    fn open(&mut self) -> PipelineResult<Arc<Schema>>;

    fn has_next(&mut self) -> PipelineResult<bool>;

    fn next_row(&mut self) -> PipelineResult<Row>;

    fn close(&mut self);
}

/// Source configuration in a pipeline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Literal rows with declared field types
    Static {
        fields: Vec<Field>,
        #[serde(default)]
        rows: Vec<Vec<serde_json::Value>>,
    },
    /// Generated rows: `value` counts up from zero, plus `name` when set
    Test {
        row_count: u64,
        #[serde(default)]
        delay_ms: u64,
        #[serde(default)]
        name: Option<String>,
    },
}

impl SourceSpec {
    /// Short label for logs
    pub fn describe(&self) -> String {
        match self {
            SourceSpec::Static { rows, .. } => format!("static:{}", rows.len()),
            SourceSpec::Test { name, row_count, .. } => {
                format!("test:{}:{}", name.as_deref().unwrap_or(""), row_count)
            }
        }
    }
}

/// Creates sources from their specification
pub trait SourceFactory: Send + Sync {
    fn create(&self, spec: &SourceSpec) -> PipelineResult<Box<dyn RowSource>>;
}

/// Builds the sources this crate ships with
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSourceFactory;

impl SourceFactory for DefaultSourceFactory {
    fn create(&self, spec: &SourceSpec) -> PipelineResult<Box<dyn RowSource>> {
        Ok(match spec {
            SourceSpec::Static { fields, rows } => {
                Box::new(StaticSource::new(fields.clone(), rows.clone()))
            }
            SourceSpec::Test {
                row_count,
                delay_ms,
                name,
            } => Box::new(TestSource::new(
                *row_count,
                Duration::from_millis(*delay_ms),
                name.clone(),
            )),
        })
    }
}

pub struct StaticSource {
    fields: Vec<Field>,
    literals: Vec<Vec<serde_json::Value>>,
    schema: Option<Arc<Schema>>,
    rows: vec::IntoIter<Vec<Value>>,
}

impl StaticSource {
    pub fn new(fields: Vec<Field>, literals: Vec<Vec<serde_json::Value>>) -> Self {
        Self {
            fields,
            literals,
            schema: None,
            rows: Vec::new().into_iter(),
        }
    }
}

/// Convert a JSON literal into a value of the declared type
fn literal_value(literal: &serde_json::Value, data_type: DataType) -> Option<Value> {
    use serde_json::Value as Json;

    match (literal, data_type) {
        (Json::Null, _) => Some(Value::Null),
        (Json::String(s), _) => data_type.parse_literal(s),
        (Json::Bool(b), DataType::Boolean) => Some(Value::Boolean(*b)),
        (Json::Number(n), DataType::Long) => n.as_i64().map(Value::Long),
        (Json::Number(n), DataType::Double) => n.as_f64().map(Value::Double),
        (other, DataType::String) => Some(Value::String(other.to_string())),
        _ => None,
    }
}

impl RowSource for StaticSource {
    fn open(&mut self) -> PipelineResult<Arc<Schema>> {
        let mut rows = Vec::with_capacity(self.literals.len());
        for (row_idx, literal_row) in self.literals.iter().enumerate() {
            let mut values = Vec::with_capacity(self.fields.len());
            for (field, literal) in self.fields.iter().zip(literal_row) {
                let value = literal_value(literal, field.data_type).ok_or_else(|| {
                    PipelineError::source(format!(
                        "Row {} has invalid {} value {} for field '{}'",
                        row_idx, field.data_type, literal, field.name
                    ))
                })?;
                values.push(value);
            }
            rows.push(values);
        }
        let schema = Arc::new(Schema::new(self.fields.clone()));
        self.schema = Some(Arc::clone(&schema));
        self.rows = rows.into_iter();
        Ok(schema)
    }

    fn has_next(&mut self) -> PipelineResult<bool> {
        Ok(!self.rows.as_slice().is_empty())
    }

    fn next_row(&mut self) -> PipelineResult<Row> {
        let schema = self
            .schema
            .clone()
            .ok_or_else(|| PipelineError::source("Static source read before open"))?;
        let values = self
            .rows
            .next()
            .ok_or_else(|| PipelineError::source("Static source exhausted"))?;
        Ok(Row::new(schema, values))
    }

    fn close(&mut self) {
        self.rows = Vec::new().into_iter();
    }
}

pub struct TestSource {
    row_count: u64,
    delay: Duration,
    name: Option<String>,
    schema: Arc<Schema>,
    produced: u64,
    closed: bool,
}

impl TestSource {
    pub fn new(row_count: u64, delay: Duration, name: Option<String>) -> Self {
        let mut fields = vec![Field::new("value", DataType::Long)];
        if name.is_some() {
            fields.push(Field::new("name", DataType::String));
        }
        Self {
            row_count,
            delay,
            name,
            schema: Arc::new(Schema::new(fields)),
            produced: 0,
            closed: false,
        }
    }
}

impl RowSource for TestSource {
    fn open(&mut self) -> PipelineResult<Arc<Schema>> {
        Ok(Arc::clone(&self.schema))
    }

    fn has_next(&mut self) -> PipelineResult<bool> {
        Ok(!self.closed && self.produced < self.row_count)
    }

    fn next_row(&mut self) -> PipelineResult<Row> {
        if self.closed {
            return Err(PipelineError::source("Test source read after close"));
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let mut values = vec![Value::Long(self.produced as i64)];
        if let Some(name) = &self.name {
            values.push(Value::String(name.clone()));
        }
        self.produced += 1;
        Ok(Row::new(Arc::clone(&self.schema), values))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
