//! Request argument compilation
//!
//! Recognised arguments become stage specifications in a fixed order,
//! whatever their order in the request:
//!
//! ```text
//! _query -> _map / _relabel -> _sort -> _offset -> _limit -> _without
//! ```
//!
//! Repeated arguments produce one stage each, in request order within
//! their slot. Arguments not starting with `_` are ignored.

use crate::pipeline::{FieldMapping, FilterExpression, StageSpec};
use crate::sort::SortKey;

use super::errors::{FilterError, FilterResult};
use super::space_parser;

/// Every argument name the compiler understands
pub const RECOGNISED_ARGUMENTS: [&str; 7] = [
    "_query", "_map", "_relabel", "_sort", "_offset", "_limit", "_without",
];

pub fn is_recognised(name: &str) -> bool {
    RECOGNISED_ARGUMENTS.contains(&name)
}

/// Position of an argument in the application order
fn slot(name: &str) -> Option<u8> {
    match name {
        "_query" => Some(0),
        "_map" | "_relabel" => Some(1),
        "_sort" => Some(2),
        "_offset" => Some(3),
        "_limit" => Some(4),
        "_without" => Some(5),
        _ => None,
    }
}

/// Compile request arguments into extra pipeline stages
pub fn compile<'a, I>(arguments: I) -> FilterResult<Vec<StageSpec>>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut recognised: Vec<(u8, &str, &str)> = arguments
        .into_iter()
        .filter_map(|(name, value)| slot(name).map(|s| (s, name, value)))
        .collect();
    // Stable, so repeated arguments keep request order
    recognised.sort_by_key(|(slot, _, _)| *slot);

    recognised
        .into_iter()
        .map(|(_, name, value)| compile_argument(name, value))
        .collect()
}

fn compile_argument(name: &str, value: &str) -> FilterResult<StageSpec> {
    match name {
        "_query" => FilterExpression::parse(value)
            .map(|expression| StageSpec::Filter { expression })
            .map_err(FilterError::InvalidQuery),
        "_limit" => parse_count(value, "limit").map(|count| StageSpec::Limit { count }),
        "_offset" => parse_count(value, "offset").map(|count| StageSpec::Offset { count }),
        "_sort" => parse_sort(value).map(|keys| StageSpec::Sort { keys }),
        "_map" => parse_mappings(value, true)
            .map(|mappings| StageSpec::Map { mappings })
            .ok_or(FilterError::InvalidMap),
        "_relabel" => parse_mappings(value, false)
            .map(|mappings| StageSpec::Relabel { mappings })
            .ok_or(FilterError::InvalidRelabel),
        _ => parse_without(value).map(|fields| StageSpec::FieldRemoval { fields }),
    }
}

fn parse_count(value: &str, filter: &'static str) -> FilterResult<u64> {
    value
        .parse::<u64>()
        .map_err(|_| FilterError::InvalidInteger(filter))
}

fn parse_sort(value: &str) -> FilterResult<Vec<SortKey>> {
    let tokens = space_parser::parse(value);
    if tokens.is_empty() {
        return Err(FilterError::InvalidSort);
    }
    tokens
        .iter()
        .map(|t| SortKey::parse(t).ok_or(FilterError::InvalidSort))
        .collect()
}

/// `SourceLabel:NewLabel` pairs split on the last colon.
///
/// An empty new label is only allowed when `allow_drop` is set.
fn parse_mappings(value: &str, allow_drop: bool) -> Option<Vec<FieldMapping>> {
    let tokens = space_parser::parse(value);
    if tokens.is_empty() {
        return None;
    }
    tokens
        .iter()
        .map(|token| {
            let (source, target) = token.rsplit_once(':')?;
            let valid = !source.is_empty()
                && !target.contains(' ')
                && (allow_drop || !target.is_empty());
            valid.then(|| FieldMapping::new(source, target))
        })
        .collect()
}

fn parse_without(value: &str) -> FilterResult<Vec<String>> {
    let fields = space_parser::parse(value);
    if fields.is_empty() {
        return Err(FilterError::InvalidWithout);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(stages: &[StageSpec]) -> Vec<&'static str> {
        stages.iter().map(StageSpec::name).collect()
    }

    #[test]
    fn test_fixed_application_order() {
        let stages = compile([
            ("_without", "a"),
            ("_limit", "12"),
            ("_offset", "1"),
            ("_sort", "-b"),
            ("_relabel", "c:d"),
            ("_query", "b==1"),
            ("plain", "ignored"),
        ])
        .unwrap();
        assert_eq!(
            names(&stages),
            vec!["filter", "relabel", "sort", "offset", "limit", "field_removal"]
        );
    }

    #[test]
    fn test_repeated_arguments_keep_request_order() {
        let stages = compile([("_map", "a:b"), ("_relabel", "b:c"), ("_map", "c:")]).unwrap();
        assert_eq!(names(&stages), vec!["map", "relabel", "map"]);
    }

    #[test]
    fn test_limit_and_offset() {
        let stages = compile([("_limit", "12"), ("_offset", "0")]).unwrap();
        assert_eq!(stages, vec![StageSpec::Offset { count: 0 }, StageSpec::Limit { count: 12 }]);

        for bad in ["bob", "-1", "1.5", ""] {
            let err = compile([("_limit", bad)]).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Invalid argument to _limit filter, should be an integer"
            );
        }
        let err = compile([("_offset", "x")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument to _offset filter, should be an integer"
        );
    }

    #[test]
    fn test_query() {
        let stages = compile([("_query", "colour==beige and dataId=le=40")]).unwrap();
        assert_eq!(names(&stages), vec!["filter"]);

        let err = compile([("_query", "colour==")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument to _query filter, should be a valid RSQL expression"
        );
    }

    #[test]
    fn test_sort() {
        let stages = compile([("_sort", "a -b")]).unwrap();
        assert_eq!(
            stages,
            vec![StageSpec::Sort {
                keys: vec![SortKey::asc("a"), SortKey::desc("b")]
            }]
        );
        assert_eq!(compile([("_sort", "")]).unwrap_err(), FilterError::InvalidSort);
        assert_eq!(compile([("_sort", "a -")]).unwrap_err(), FilterError::InvalidSort);
    }

    #[test]
    fn test_map_drop_semantics() {
        let stages = compile([("_map", "BoolField: TextField:")]).unwrap();
        assert_eq!(
            stages,
            vec![StageSpec::Map {
                mappings: vec![
                    FieldMapping::new("BoolField", ""),
                    FieldMapping::new("TextField", ""),
                ]
            }]
        );
    }

    #[test]
    fn test_map_splits_on_last_colon() {
        let stages = compile([("_map", "a:b:c")]).unwrap();
        assert_eq!(
            stages,
            vec![StageSpec::Map {
                mappings: vec![FieldMapping::new("a:b", "c")]
            }]
        );
    }

    #[test]
    fn test_map_rejections() {
        for bad in ["", "nocolon", ":target", "a:b  c"] {
            assert_eq!(compile([("_map", bad)]).unwrap_err(), FilterError::InvalidMap, "{:?}", bad);
        }
        let message = FilterError::InvalidMap.to_string();
        assert!(message.contains("SourceLabel:NewLabel.  The new label"));
    }

    #[test]
    fn test_relabel_requires_both_labels() {
        assert!(compile([("_relabel", "A:B")]).is_ok());
        assert_eq!(compile([("_relabel", "A:")]).unwrap_err(), FilterError::InvalidRelabel);
        assert_eq!(compile([("_relabel", ":B")]).unwrap_err(), FilterError::InvalidRelabel);
    }

    #[test]
    fn test_without() {
        let stages = compile([("_without", "a  b c")]).unwrap();
        assert_eq!(
            stages,
            vec![StageSpec::FieldRemoval {
                fields: vec!["a b".into(), "c".into()]
            }]
        );
        let err = compile([("_without", " ")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument to _without filter, should be a space delimited list of fields"
        );
    }

    #[test]
    fn test_recognised() {
        assert!(is_recognised("_limit"));
        assert!(!is_recognised("_fmt"));
        assert!(!is_recognised("limit"));
    }
}
