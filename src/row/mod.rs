//! # Row & Field Model
//!
//! Typed records shared by every pipeline stage.
//!
//! A [`Row`] is an ordered list of values bound to a shared [`Schema`].
//! Field order is significant: it defines output column order. Stages that
//! add, drop or rename fields publish a new schema for downstream stages
//! and rebuild their rows against it.

mod schema;
mod value;

pub use schema::{Field, Schema};
pub use value::{DataType, Value};

use std::sync::Arc;

/// Fixed per-row overhead used when estimating serialized size.
const ROW_OVERHEAD_BYTES: usize = 16;

/// A single record flowing through a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row from a schema and values in schema order.
    ///
    /// Missing trailing values are padded with [`Value::Null`]; surplus
    /// values are dropped.
    pub fn new(schema: Arc<Schema>, mut values: Vec<Value>) -> Self {
        values.resize(schema.len(), Value::Null);
        Self { schema, values }
    }

    /// Build a row from `(name, value)` pairs, inferring the schema from the
    /// values. Intended for tests and static sources.
    pub fn from_pairs<S: Into<String>>(pairs: Vec<(S, Value)>) -> Self {
        let mut fields = Vec::with_capacity(pairs.len());
        let mut values = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            let data_type = value.data_type().unwrap_or(DataType::String);
            fields.push(Field::new(name, data_type));
            values.push(value);
        }
        Self::new(Arc::new(Schema::new(fields)), values)
    }

    /// The schema this row conforms to.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Values in field order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Look up a value by field name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|idx| &self.values[idx])
    }

    /// Value at a field index.
    pub fn value_at(&self, idx: usize) -> &Value {
        &self.values[idx]
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Rough size of this row once serialized, used for sort memory budgets.
    pub fn estimated_size(&self) -> usize {
        ROW_OVERHEAD_BYTES
            + self
                .values
                .iter()
                .map(Value::estimated_size)
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_keeps_order() {
        let row = Row::from_pairs(vec![
            ("b", Value::Long(1)),
            ("a", Value::String("x".into())),
        ]);
        assert_eq!(row.schema().names(), vec!["b", "a"]);
        assert_eq!(row.get("a"), Some(&Value::String("x".into())));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_new_pads_missing_values() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Long),
            Field::new("name", DataType::String),
        ]));
        let row = Row::new(schema, vec![Value::Long(7)]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.value_at(1), &Value::Null);
    }

    #[test]
    fn test_estimated_size_grows_with_strings() {
        let short = Row::from_pairs(vec![("s", Value::String("a".into()))]);
        let long = Row::from_pairs(vec![("s", Value::String("a".repeat(100)))]);
        assert!(long.estimated_size() > short.estimated_size());
    }
}
