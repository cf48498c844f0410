//! Space-delimited argument lists
//!
//! A single space separates tokens. A run of `n >= 2` spaces is not a
//! separator; it becomes `n - 1` literal spaces inside the token. Tokens are
//! trimmed and empty tokens dropped.
//!
//! ```text
//! "a b"    -> ["a", "b"]
//! "a  b"   -> ["a b"]
//! "a   b"  -> ["a  b"]
//! ```

/// Split an argument value into tokens
pub fn parse(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != ' ' {
            current.push(c);
            continue;
        }
        let mut run = 1;
        while chars.next_if_eq(&' ').is_some() {
            run += 1;
        }
        if run == 1 {
            push_token(&mut tokens, &mut current);
        } else {
            current.extend(std::iter::repeat(' ').take(run - 1));
        }
    }
    push_token(&mut tokens, &mut current);
    tokens
}

fn push_token(tokens: &mut Vec<String>, current: &mut String) {
    let token = current.trim_matches(' ');
    if !token.is_empty() {
        tokens.push(token.to_string());
    }
    current.clear();
}

/// Inverse of [`parse`] for trimmed, non-empty tokens: each run of spaces
/// inside a token is widened by one so it survives re-parsing
pub fn join<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut out = String::new();
    for (idx, token) in tokens.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        let mut in_run = false;
        for c in token.as_ref().chars() {
            if c == ' ' && !in_run {
                out.push(' ');
            }
            in_run = c == ' ';
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_spaces_delimit() {
        assert_eq!(parse("a b"), vec!["a", "b"]);
        assert_eq!(parse("alpha beta gamma"), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_multiple_spaces_collapse_by_one() {
        assert_eq!(parse("a  b"), vec!["a b"]);
        assert_eq!(parse("a   b"), vec!["a  b"]);
        assert_eq!(parse("a  b c"), vec!["a b", "c"]);
    }

    #[test]
    fn test_tokens_are_trimmed() {
        assert_eq!(parse(" a"), vec!["a"]);
        assert_eq!(parse("a "), vec!["a"]);
        assert_eq!(parse("  a  "), vec!["a"]);
        assert!(parse("").is_empty());
        assert!(parse("   ").is_empty());
    }

    #[test]
    fn test_unicode() {
        assert_eq!(parse("größe  ä ü"), vec!["größe ä", "ü"]);
        assert_eq!(parse("日本 語"), vec!["日本", "語"]);
    }

    #[test]
    fn test_join_round_trip() {
        let inputs = [
            "a b",
            "a  b",
            "a   b  c",
            "  lead trail  ",
            "x    y z",
            "größe  ä ü",
            "BoolField: TextField:",
            "",
        ];
        for input in inputs {
            let tokens = parse(input);
            assert_eq!(parse(&join(&tokens)), tokens, "input {:?}", input);
            for token in &tokens {
                assert!(!token.starts_with(' ') && !token.ends_with(' '));
            }
        }
    }

    #[test]
    fn test_plain_join_round_trips_simple_tokens() {
        let tokens = parse("a b c");
        assert_eq!(parse(&tokens.join(" ")), tokens);
    }
}
