//! Stage specifications
//!
//! Stateless configuration, produced either by a pipeline definition or by
//! the filter compiler. Turned into a [`Stage`](super::Stage) per execution.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::expression::{parse_query, Expr, ParseError};
use crate::sort::SortKey;

/// `source` renamed to `target`; an empty target drops the field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source: String,
    #[serde(default)]
    pub target: String,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn drops(&self) -> bool {
        self.target.is_empty()
    }
}

/// A parsed filter expression that keeps its source text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilterExpression {
    text: String,
    expr: Arc<Expr>,
}

impl FilterExpression {
    pub fn parse(text: impl Into<String>) -> Result<Self, ParseError> {
        let text = text.into();
        let expr = parse_query(&text)?;
        Ok(Self {
            text,
            expr: Arc::new(expr),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl PartialEq for FilterExpression {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl TryFrom<String> for FilterExpression {
    type Error = ParseError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(text)
    }
}

impl From<FilterExpression> for String {
    fn from(filter: FilterExpression) -> Self {
        filter.text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageSpec {
    Map { mappings: Vec<FieldMapping> },
    Relabel { mappings: Vec<FieldMapping> },
    Sort { keys: Vec<SortKey> },
    Limit { count: u64 },
    Offset { count: u64 },
    Filter { expression: FilterExpression },
    FieldRemoval { fields: Vec<String> },
}

impl StageSpec {
    pub fn name(&self) -> &'static str {
        match self {
            StageSpec::Map { .. } => "map",
            StageSpec::Relabel { .. } => "relabel",
            StageSpec::Sort { .. } => "sort",
            StageSpec::Limit { .. } => "limit",
            StageSpec::Offset { .. } => "offset",
            StageSpec::Filter { .. } => "filter",
            StageSpec::FieldRemoval { .. } => "field_removal",
        }
    }
}

impl fmt::Display for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join_mappings = |mappings: &[FieldMapping]| {
            mappings
                .iter()
                .map(|m| format!("{}:{}", m.source, m.target))
                .collect::<Vec<_>>()
                .join(" ")
        };
        match self {
            StageSpec::Map { mappings } => write!(f, "map({})", join_mappings(mappings)),
            StageSpec::Relabel { mappings } => write!(f, "relabel({})", join_mappings(mappings)),
            StageSpec::Sort { keys } => {
                let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
                write!(f, "sort({})", keys.join(" "))
            }
            StageSpec::Limit { count } => write!(f, "limit({})", count),
            StageSpec::Offset { count } => write!(f, "offset({})", count),
            StageSpec::Filter { expression } => write!(f, "filter({})", expression.text()),
            StageSpec::FieldRemoval { fields } => write!(f, "without({})", fields.join(" ")),
        }
    }
}
