//! Field values and their data types.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// The declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Long,
    Double,
    Boolean,
    Date,
    Time,
    DateTime,
}

impl DataType {
    /// Returns the type name as used in pipeline definitions
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "String",
            DataType::Long => "Long",
            DataType::Double => "Double",
            DataType::Boolean => "Boolean",
            DataType::Date => "Date",
            DataType::Time => "Time",
            DataType::DateTime => "DateTime",
        }
    }

    /// Parse literal text into a value of this type.
    ///
    /// Returns `None` if the text cannot be coerced.
    pub fn parse_literal(&self, text: &str) -> Option<Value> {
        match self {
            DataType::String => Some(Value::String(text.to_string())),
            DataType::Long => text.trim().parse().ok().map(Value::Long),
            DataType::Double => text.trim().parse().ok().map(Value::Double),
            DataType::Boolean => {
                let text = text.trim();
                if text.eq_ignore_ascii_case("true") {
                    Some(Value::Boolean(true))
                } else if text.eq_ignore_ascii_case("false") {
                    Some(Value::Boolean(false))
                } else {
                    None
                }
            }
            DataType::Date => parse_date(text).map(Value::Date),
            DataType::Time => parse_time(text).map(Value::Time),
            DataType::DateTime => parse_date_time(text).map(Value::DateTime),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    String(String),
    Long(i64),
    /// Stored by bit pattern so NaN and infinities survive a round trip
    #[serde(with = "double_bits")]
    Double(f64),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl Value {
    /// The runtime type of this value, `None` for null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::String(_) => Some(DataType::String),
            Value::Long(_) => Some(DataType::Long),
            Value::Double(_) => Some(DataType::Double),
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Date(_) => Some(DataType::Date),
            Value::Time(_) => Some(DataType::Time),
            Value::DateTime(_) => Some(DataType::DateTime),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Approximate serialized size in bytes.
    pub fn estimated_size(&self) -> usize {
        match self {
            Value::Null => 1,
            Value::String(s) => 24 + s.len(),
            Value::Long(_) | Value::Double(_) => 8,
            Value::Boolean(_) => 1,
            Value::Date(_) => 4,
            Value::Time(_) => 8,
            Value::DateTime(_) => 12,
        }
    }

    /// Total ordering used by sorting.
    ///
    /// Nulls sort first. Values of the same variant use their natural order
    /// (doubles via `total_cmp`); mixed variants order by variant rank.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Long(a), Value::Long(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Long(a), Value::Double(b)) => (*a as f64).total_cmp(b),
            (Value::Double(a), Value::Long(b)) => a.total_cmp(&(*b as f64)),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Long(_) | Value::Double(_) => 2,
            Value::Date(_) => 3,
            Value::Time(_) => 4,
            Value::DateTime(_) => 5,
            Value::String(_) => 6,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::String(s) => f.write_str(s),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write_time(f, t),
            Value::DateTime(dt) => {
                write!(f, "{}T", dt.date().format("%Y-%m-%d"))?;
                write_time(f, &dt.time())
            }
        }
    }
}

/// ISO-8601 local time, omitting zero seconds and fractions.
fn write_time(f: &mut fmt::Formatter<'_>, t: &NaiveTime) -> fmt::Result {
    if t.nanosecond() != 0 {
        write!(f, "{}", t.format("%H:%M:%S%.f"))
    } else if t.second() != 0 {
        write!(f, "{}", t.format("%H:%M:%S"))
    } else {
        write!(f, "{}", t.format("%H:%M"))
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0))
}

mod double_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        u64::deserialize(deserializer).map(f64::from_bits)
    }
}
