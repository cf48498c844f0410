//! Delimited text output
//!
//! - Header row of quoted field names
//! - Strings and temporal values quoted, embedded `"` doubled
//! - Numbers and booleans bare, null empty
//! - `\n` after every line

use std::io::{self, Write};

use crate::row::{Row, Schema, Value};

pub struct DelimitedFormatter {
    delimiter: u8,
}

impl DelimitedFormatter {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    pub fn begin<W: Write>(&mut self, schema: &Schema, out: &mut W) -> io::Result<()> {
        for (idx, field) in schema.fields().iter().enumerate() {
            if idx > 0 {
                out.write_all(&[self.delimiter])?;
            }
            write_quoted(out, &field.name)?;
        }
        out.write_all(b"\n")
    }

    pub fn row<W: Write>(&mut self, row: &Row, out: &mut W) -> io::Result<()> {
        for (idx, value) in row.values().iter().enumerate() {
            if idx > 0 {
                out.write_all(&[self.delimiter])?;
            }
            match value {
                Value::Null => {}
                Value::Long(_) | Value::Double(_) | Value::Boolean(_) => {
                    write!(out, "{}", value)?;
                }
                Value::String(s) => write_quoted(out, s)?,
                Value::Date(_) | Value::Time(_) | Value::DateTime(_) => {
                    write_quoted(out, &value.to_string())?;
                }
            }
        }
        out.write_all(b"\n")
    }
}

fn write_quoted<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    out.write_all(b"\"")?;
    let mut rest = text;
    while let Some(pos) = rest.find('"') {
        out.write_all(rest[..=pos].as_bytes())?;
        out.write_all(b"\"")?;
        rest = &rest[pos + 1..];
    }
    out.write_all(rest.as_bytes())?;
    out.write_all(b"\"")
}
