//! Row evaluation
//!
//! Literals are coerced to the runtime type of the field value. A literal
//! that cannot be coerced, a null value or a missing field makes the
//! comparison false.

use std::cmp::Ordering;

use crate::row::{Row, Value};

use super::ast::{Comparison, Expr, Literal, Operator};

impl Expr {
    /// Evaluate the expression against a row
    pub fn evaluate(&self, row: &Row) -> bool {
        match self {
            Expr::Comparison(c) => c.evaluate(row),
            Expr::And(children) => children.iter().all(|e| e.evaluate(row)),
            Expr::Or(children) => children.iter().any(|e| e.evaluate(row)),
            Expr::Not(inner) => !inner.evaluate(row),
        }
    }
}

impl Comparison {
    pub fn evaluate(&self, row: &Row) -> bool {
        let value = match row.get(&self.field) {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };

        match self.operator {
            Operator::Matches => match &self.pattern {
                Some(pattern) => pattern.is_match(&value.to_string()),
                None => false,
            },
            Operator::In => {
                let mut matched = false;
                for arg in &self.arguments {
                    match compare(value, arg) {
                        Some(Ordering::Equal) => matched = true,
                        Some(_) => {}
                        None => return false,
                    }
                }
                matched
            }
            Operator::NotIn => {
                let mut matched = false;
                for arg in &self.arguments {
                    match compare(value, arg) {
                        Some(Ordering::Equal) => matched = true,
                        Some(_) => {}
                        None => return false,
                    }
                }
                !matched
            }
            Operator::Equal | Operator::NotEqual => {
                let Some(arg) = self.arguments.first() else {
                    return false;
                };
                let equal = match value {
                    Value::String(s) => arg.string_match().is_match(s),
                    _ => match compare(value, arg) {
                        Some(ordering) => ordering == Ordering::Equal,
                        None => return false,
                    },
                };
                equal == (self.operator == Operator::Equal)
            }
            Operator::GreaterThan
            | Operator::GreaterThanOrEqual
            | Operator::LessThan
            | Operator::LessThanOrEqual => {
                let Some(ordering) = self.arguments.first().and_then(|arg| compare(value, arg))
                else {
                    return false;
                };
                match self.operator {
                    Operator::GreaterThan => ordering == Ordering::Greater,
                    Operator::GreaterThanOrEqual => ordering != Ordering::Less,
                    Operator::LessThan => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                }
            }
        }
    }
}

/// Order `value` relative to the literal coerced to the value's type.
fn compare(value: &Value, literal: &Literal) -> Option<Ordering> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.as_str().cmp(literal.raw())),
        Value::Long(v) => literal.as_long().map(|l| v.cmp(&l)),
        Value::Double(v) => literal.as_double().and_then(|l| v.partial_cmp(&l)),
        Value::Boolean(v) => literal.as_bool().map(|l| v.cmp(&l)),
        Value::Date(v) => literal.as_date().map(|l| v.cmp(&l)),
        Value::Time(v) => literal.as_time().map(|l| v.cmp(&l)),
        Value::DateTime(v) => literal.as_date_time().map(|l| v.cmp(&l)),
    }
}
