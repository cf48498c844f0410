//! # Filter Compiler
//!
//! Turns the `_`-prefixed request arguments into extra pipeline stages
//! appended after the ones a pipeline definition declares.
//!
//! | Argument | Value | Stage |
//! |---|---|---|
//! | `_query` | RSQL/FIQL expression | filter |
//! | `_map` | `Source:Target ...`, empty target drops | map |
//! | `_relabel` | `Source:Target ...` | relabel |
//! | `_sort` | `field -field ...` | sort |
//! | `_offset` | integer | offset |
//! | `_limit` | integer | limit |
//! | `_without` | `field ...` | field removal |

mod compiler;
mod errors;
pub mod space_parser;

pub use compiler::{compile, is_recognised, RECOGNISED_ARGUMENTS};
pub use errors::{FilterError, FilterResult};
