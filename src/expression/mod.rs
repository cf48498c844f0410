//! # Filter Expressions
//!
//! RSQL/FIQL boolean expressions over a row's fields.
//!
//! ```text
//! colour==beige;dataId=le=40
//! colour==beige and dataId=le=40
//! name=in=(red,'light blue'),name=~'^gr.*'
//! ```
//!
//! Expressions are parsed once per filter and evaluated for every row.

mod ast;
mod errors;
mod evaluator;
mod fiql;
mod parser;

pub use ast::{Comparison, Expr, Literal, Operator, StringMatch};
pub use errors::{ParseError, ParseResult};
pub use fiql::convert_fiql_to_rsql;
pub use parser::parse;

/// Parse a user-supplied filter, applying the FIQL quoting shim first.
pub fn parse_query(text: &str) -> ParseResult<Expr> {
    parse(&convert_fiql_to_rsql(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_quotes_fiql_value() {
        let expr = parse_query("colour==light blue").unwrap();
        assert_eq!(expr.to_string(), "colour=='light blue'");
        assert!(parse("colour==light blue").is_err());
    }

    #[test]
    fn test_fields() {
        let expr = parse_query("a==1;(b==2,a==3)").unwrap();
        assert_eq!(expr.fields(), vec!["a", "b"]);
    }
}
