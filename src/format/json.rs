//! JSON array output
//!
//! One object per row with keys in field order. Temporal values render as
//! ISO-8601 strings; non-finite doubles as `null`.

use std::io::{self, Write};
use std::sync::Arc;

use crate::row::{Row, Schema, Value};

#[derive(Default)]
pub struct JsonFormatter {
    /// Pre-encoded keys for `schema`
    keys: Vec<String>,
    schema: Option<Arc<Schema>>,
    rows: u64,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin<W: Write>(&mut self, _schema: &Schema, out: &mut W) -> io::Result<()> {
        out.write_all(b"[")
    }

    pub fn row<W: Write>(&mut self, row: &Row, out: &mut W) -> io::Result<()> {
        let cached = self
            .schema
            .as_ref()
            .map_or(false, |s| Arc::ptr_eq(s, row.schema()));
        if !cached {
            self.keys = row
                .schema()
                .fields()
                .iter()
                .map(|f| serde_json::to_string(&f.name))
                .collect::<Result<_, _>>()?;
            self.schema = Some(Arc::clone(row.schema()));
        }

        if self.rows > 0 {
            out.write_all(b",")?;
        }
        out.write_all(b"{")?;
        for (idx, (key, value)) in self.keys.iter().zip(row.values()).enumerate() {
            if idx > 0 {
                out.write_all(b",")?;
            }
            out.write_all(key.as_bytes())?;
            out.write_all(b":")?;
            write_value(out, value)?;
        }
        out.write_all(b"}")?;
        self.rows += 1;
        Ok(())
    }

    pub fn end<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        out.write_all(b"]")
    }
}

fn write_value<W: Write>(out: &mut W, value: &Value) -> io::Result<()> {
    match value {
        Value::Null => out.write_all(b"null"),
        Value::Double(v) if !v.is_finite() => out.write_all(b"null"),
        Value::Long(v) => Ok(serde_json::to_writer(out, v)?),
        Value::Double(v) => Ok(serde_json::to_writer(out, v)?),
        Value::Boolean(v) => Ok(serde_json::to_writer(out, v)?),
        Value::String(s) => Ok(serde_json::to_writer(out, s)?),
        Value::Date(_) | Value::Time(_) | Value::DateTime(_) => {
            Ok(serde_json::to_writer(out, &value.to_string())?)
        }
    }
}
