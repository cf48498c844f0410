//! Expression AST
//!
//! Built once per filter and shared read-only across every row of one
//! execution.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::row::DataType;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `=gt=`
    GreaterThan,
    /// `=ge=`
    GreaterThanOrEqual,
    /// `=lt=`
    LessThan,
    /// `=le=`
    LessThanOrEqual,
    /// `=in=`
    In,
    /// `=out=`
    NotIn,
    /// `=~`, regular expression match
    Matches,
}

impl Operator {
    /// The operator as written in an expression
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::GreaterThan => "=gt=",
            Operator::GreaterThanOrEqual => "=ge=",
            Operator::LessThan => "=lt=",
            Operator::LessThanOrEqual => "=le=",
            Operator::In => "=in=",
            Operator::NotIn => "=out=",
            Operator::Matches => "=~",
        }
    }

    /// Look up a named `=xxx=` operator
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gt" => Some(Operator::GreaterThan),
            "ge" => Some(Operator::GreaterThanOrEqual),
            "lt" => Some(Operator::LessThan),
            "le" => Some(Operator::LessThanOrEqual),
            "in" => Some(Operator::In),
            "out" => Some(Operator::NotIn),
            _ => None,
        }
    }

    /// Whether the operator takes a list of arguments
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// How a string literal matches for `==` / `!=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringMatch {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl StringMatch {
    /// Leading and trailing `*` are wildcards; any other `*` is literal.
    pub fn from_literal(raw: &str) -> Self {
        let leading = raw.starts_with('*');
        let trailing = raw.len() > 1 && raw.ends_with('*');
        let start = usize::from(leading);
        let end = raw.len() - usize::from(trailing);
        let core = if start <= end { &raw[start..end] } else { "" };
        match (leading, trailing) {
            (true, true) => StringMatch::Contains(core.to_string()),
            (true, false) => StringMatch::Suffix(core.to_string()),
            (false, true) => StringMatch::Prefix(core.to_string()),
            (false, false) => StringMatch::Exact(raw.to_string()),
        }
    }

    pub fn is_match(&self, value: &str) -> bool {
        match self {
            StringMatch::Exact(s) => value == s,
            StringMatch::Prefix(s) => value.starts_with(s.as_str()),
            StringMatch::Suffix(s) => value.ends_with(s.as_str()),
            StringMatch::Contains(s) => value.contains(s.as_str()),
        }
    }
}

/// A literal argument with every typed interpretation resolved up front.
#[derive(Debug, Clone)]
pub struct Literal {
    raw: String,
    string_match: StringMatch,
    long: Option<i64>,
    double: Option<f64>,
    boolean: Option<bool>,
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    date_time: Option<NaiveDateTime>,
}

impl Literal {
    pub fn new(raw: impl Into<String>) -> Self {
        use crate::row::Value;

        let raw = raw.into();
        let typed = |data_type: DataType| data_type.parse_literal(&raw);
        let long = match typed(DataType::Long) {
            Some(Value::Long(v)) => Some(v),
            _ => None,
        };
        let double = match typed(DataType::Double) {
            Some(Value::Double(v)) => Some(v),
            _ => None,
        };
        let boolean = match typed(DataType::Boolean) {
            Some(Value::Boolean(v)) => Some(v),
            _ => None,
        };
        let date = match typed(DataType::Date) {
            Some(Value::Date(v)) => Some(v),
            _ => None,
        };
        let time = match typed(DataType::Time) {
            Some(Value::Time(v)) => Some(v),
            _ => None,
        };
        let date_time = match typed(DataType::DateTime) {
            Some(Value::DateTime(v)) => Some(v),
            _ => None,
        };
        Self {
            string_match: StringMatch::from_literal(&raw),
            raw,
            long,
            double,
            boolean,
            date,
            time,
            date_time,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn string_match(&self) -> &StringMatch {
        &self.string_match
    }

    pub fn as_long(&self) -> Option<i64> {
        self.long
    }

    pub fn as_double(&self) -> Option<f64> {
        self.double
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.boolean
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        self.time
    }

    pub fn as_date_time(&self) -> Option<NaiveDateTime> {
        self.date_time
    }
}

/// `field <op> arguments`
#[derive(Debug, Clone)]
pub struct Comparison {
    pub field: String,
    pub operator: Operator,
    pub arguments: Vec<Literal>,
    /// Compiled pattern for [`Operator::Matches`]
    pub pattern: Option<Regex>,
}

/// Expression tree
#[derive(Debug, Clone)]
pub enum Expr {
    Comparison(Comparison),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Every field name referenced by the expression, in first-seen order
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Comparison(c) => {
                if !out.contains(&c.field.as_str()) {
                    out.push(&c.field);
                }
            }
            Expr::And(children) | Expr::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Expr::Not(inner) => inner.collect_fields(out),
        }
    }
}

fn write_argument(f: &mut fmt::Formatter<'_>, raw: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in raw.chars() {
        if c == '\'' || c == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{}", c)?;
    }
    f.write_str("'")
}

/// Canonical RSQL rendering: quoted arguments, parenthesised groups
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Comparison(c) => {
                write!(f, "{}{}", c.field, c.operator)?;
                if c.operator.is_multi_valued() {
                    f.write_str("(")?;
                    for (i, arg) in c.arguments.iter().enumerate() {
                        if i > 0 {
                            f.write_str(",")?;
                        }
                        write_argument(f, arg.raw())?;
                    }
                    f.write_str(")")
                } else {
                    match c.arguments.first() {
                        Some(arg) => write_argument(f, arg.raw()),
                        None => Ok(()),
                    }
                }
            }
            Expr::And(children) | Expr::Or(children) => {
                let sep = if matches!(self, Expr::And(_)) { ";" } else { "," };
                f.write_str("(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
            Expr::Not(inner) => write!(f, "!({})", inner),
        }
    }
}
