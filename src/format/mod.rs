//! # Output Formats
//!
//! Streaming renderers from rows to bytes, selected by the request's
//! file extension.
//!
//! | Extension | Renderer | Content type |
//! |---|---|---|
//! | `tsv` | [`DelimitedFormatter`] with `\t` | `text/tab-separated-values` |
//! | `csv` | [`DelimitedFormatter`] with `,` | `text/csv` |
//! | `json` | [`JsonFormatter`] | `application/json` |

mod delimited;
mod json;

pub use delimited::DelimitedFormatter;
pub use json::JsonFormatter;

use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::row::{Row, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Tsv,
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Tsv => "tsv",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "tsv" => Some(OutputFormat::Tsv),
            "csv" => Some(OutputFormat::Csv),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Tsv => "text/tab-separated-values; charset=utf-8",
            OutputFormat::Csv => "text/csv; charset=utf-8",
            OutputFormat::Json => "application/json",
        }
    }

    pub fn formatter(&self) -> Formatter {
        match self {
            OutputFormat::Tsv => Formatter::Delimited(DelimitedFormatter::new(b'\t')),
            OutputFormat::Csv => Formatter::Delimited(DelimitedFormatter::new(b',')),
            OutputFormat::Json => Formatter::Json(JsonFormatter::new()),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A renderer for one response
pub enum Formatter {
    Delimited(DelimitedFormatter),
    Json(JsonFormatter),
}

impl Formatter {
    pub fn begin<W: Write>(&mut self, schema: &Schema, out: &mut W) -> io::Result<()> {
        match self {
            Formatter::Delimited(f) => f.begin(schema, out),
            Formatter::Json(f) => f.begin(schema, out),
        }
    }

    pub fn row<W: Write>(&mut self, row: &Row, out: &mut W) -> io::Result<()> {
        match self {
            Formatter::Delimited(f) => f.row(row, out),
            Formatter::Json(f) => f.row(row, out),
        }
    }

    pub fn end<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        match self {
            Formatter::Delimited(_) => Ok(()),
            Formatter::Json(f) => f.end(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions() {
        for format in [OutputFormat::Tsv, OutputFormat::Csv, OutputFormat::Json] {
            assert_eq!(OutputFormat::from_extension(format.extension()), Some(format));
        }
        assert_eq!(OutputFormat::from_extension("TSV"), Some(OutputFormat::Tsv));
        assert_eq!(OutputFormat::from_extension("xlsx"), None);
    }
}
