//! RSQL parser
//!
//! Grammar:
//!
//! ```text
//! or         := and ( ( "," | " or " ) and )*
//! and        := constraint ( ( ";" | " and " ) constraint )*
//! constraint := "(" or ")" | "!(" or ")" | comparison
//! comparison := selector operator arguments
//! operator   := "==" | "!=" | "=~" | "<" | "<=" | ">" | ">=" | "=" name "="
//! arguments  := "(" value ( "," value )* ")" | value
//! value      := unreserved+ | '"' ... '"' | "'" ... "'"
//! ```
//!
//! Whitespace is allowed between tokens. The `and` / `or` keywords must be
//! surrounded by whitespace.

use regex::Regex;

use super::ast::{Comparison, Expr, Literal, Operator};
use super::errors::{ParseError, ParseResult};

/// Deepest permitted parenthesis nesting
const MAX_DEPTH: usize = 64;

/// Parse an RSQL expression into an [`Expr`].
pub fn parse(text: &str) -> ParseResult<Expr> {
    let mut parser = Parser::new(text);
    parser.skip_ws();
    if parser.at_end() {
        return Err(parser.error("Empty expression"));
    }
    let expr = parser.parse_or(0)?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("Unexpected input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

fn is_reserved(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '(' | ')' | ';' | ',' | '=' | '!' | '~' | '<' | '>')
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn rest(&self) -> &'a str {
        match self.chars.get(self.pos) {
            Some((offset, _)) => &self.src[*offset..],
            None => "",
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.rest())
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    /// Consume `keyword` followed by whitespace, case-insensitively.
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let len = keyword.chars().count();
        let matches = keyword
            .chars()
            .enumerate()
            .all(|(i, k)| self.peek_at(i).map_or(false, |c| c.eq_ignore_ascii_case(&k)));
        if matches && self.peek_at(len).map_or(false, char::is_whitespace) {
            self.pos += len;
            true
        } else {
            false
        }
    }

    /// Consume a logical separator, either a symbol or a spaced keyword.
    fn eat_separator(&mut self, symbol: char, keyword: &str) -> bool {
        let start = self.pos;
        let had_ws = self.skip_ws();
        if self.eat(symbol) || (had_ws && self.eat_keyword(keyword)) {
            return true;
        }
        self.pos = start;
        false
    }

    fn parse_or(&mut self, depth: usize) -> ParseResult<Expr> {
        let mut children = vec![self.parse_and(depth)?];
        while self.eat_separator(',', "or") {
            children.push(self.parse_and(depth)?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Expr::Or(children)
        })
    }

    fn parse_and(&mut self, depth: usize) -> ParseResult<Expr> {
        let mut children = vec![self.parse_constraint(depth)?];
        while self.eat_separator(';', "and") {
            children.push(self.parse_constraint(depth)?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Expr::And(children)
        })
    }

    fn parse_constraint(&mut self, depth: usize) -> ParseResult<Expr> {
        self.skip_ws();
        match (self.peek(), self.peek_at(1)) {
            (Some('('), _) => {
                self.pos += 1;
                self.parse_group(depth)
            }
            (Some('!'), Some('(')) => {
                self.pos += 2;
                Ok(Expr::Not(Box::new(self.parse_group(depth)?)))
            }
            _ => self.parse_comparison().map(Expr::Comparison),
        }
    }

    fn parse_group(&mut self, depth: usize) -> ParseResult<Expr> {
        if depth >= MAX_DEPTH {
            return Err(self.error("Expression nested too deeply"));
        }
        let inner = self.parse_or(depth + 1)?;
        self.skip_ws();
        if !self.eat(')') {
            return Err(self.error("Missing closing parenthesis"));
        }
        Ok(inner)
    }

    fn parse_comparison(&mut self) -> ParseResult<Comparison> {
        let field = self.parse_selector()?;
        self.skip_ws();
        let operator = self.parse_operator()?;
        self.skip_ws();
        let arguments = self.parse_arguments(operator)?;

        let pattern = if operator == Operator::Matches {
            let source = arguments.first().map(Literal::raw).unwrap_or_default();
            let regex = Regex::new(source).map_err(|e| {
                ParseError::new(format!("Invalid regular expression: {}", e), source)
            })?;
            Some(regex)
        } else {
            None
        };

        Ok(Comparison {
            field,
            operator,
            arguments,
            pattern,
        })
    }

    fn parse_selector(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return Err(self.error("Expected field name")),
        }
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(name)
    }

    fn parse_operator(&mut self) -> ParseResult<Operator> {
        let start = self.pos;
        match self.bump() {
            Some('=') => match self.peek() {
                Some('=') => {
                    self.pos += 1;
                    Ok(Operator::Equal)
                }
                Some('~') => {
                    self.pos += 1;
                    Ok(Operator::Matches)
                }
                Some(c) if c.is_ascii_alphabetic() => {
                    let mut name = String::new();
                    while let Some(c) = self.peek().filter(char::is_ascii_alphabetic) {
                        name.push(c);
                        self.pos += 1;
                    }
                    let operator = Operator::from_name(&name).filter(|_| self.eat('='));
                    operator.ok_or_else(|| {
                        self.pos = start;
                        self.error("Unknown comparison operator")
                    })
                }
                _ => {
                    self.pos = start;
                    Err(self.error("Expected comparison operator"))
                }
            },
            Some('!') if self.eat('=') => Ok(Operator::NotEqual),
            Some('<') if self.eat('=') => Ok(Operator::LessThanOrEqual),
            Some('<') => Ok(Operator::LessThan),
            Some('>') if self.eat('=') => Ok(Operator::GreaterThanOrEqual),
            Some('>') => Ok(Operator::GreaterThan),
            _ => {
                self.pos = start;
                Err(self.error("Expected comparison operator"))
            }
        }
    }

    fn parse_arguments(&mut self, operator: Operator) -> ParseResult<Vec<Literal>> {
        if !self.eat('(') {
            return Ok(vec![self.parse_value()?]);
        }
        let mut values = Vec::new();
        loop {
            self.skip_ws();
            values.push(self.parse_value()?);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat(')') {
                break;
            }
            return Err(self.error("Expected ',' or ')' in argument list"));
        }
        if values.len() > 1 && !operator.is_multi_valued() {
            return Err(self.error(format!(
                "Operator {} takes a single argument",
                operator
            )));
        }
        Ok(values)
    }

    fn parse_value(&mut self) -> ParseResult<Literal> {
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                let start = self.pos;
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some('\\') => match self.bump() {
                            Some(c) => value.push(c),
                            None => break,
                        },
                        Some(c) if c == quote => return Ok(Literal::new(value)),
                        Some(c) => value.push(c),
                        None => break,
                    }
                }
                self.pos = start;
                Err(self.error("Unterminated quoted value"))
            }
            _ => {
                let mut value = String::new();
                while let Some(c) = self.peek().filter(|c| !is_reserved(*c)) {
                    value.push(c);
                    self.pos += 1;
                }
                if value.is_empty() {
                    return Err(self.error("Expected value"));
                }
                Ok(Literal::new(value))
            }
        }
    }
}
