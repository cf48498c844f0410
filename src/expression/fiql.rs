//! FIQL compatibility shim
//!
//! Rewrites a lone FIQL-style comparison whose value contains characters
//! RSQL reserves, e.g. `name==hello world`, into `name=='hello world'`.
//! Anything more complex is passed through untouched.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

fn single_comparison() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(==|!=)(.*)$").ok())
        .as_ref()
}

fn multiple_comparisons() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"[A-Za-z_][A-Za-z0-9_]*\s*(==|!=|=[a-z]+=|=~).*[;,].*[A-Za-z_][A-Za-z0-9_]*\s*(==|!=|=[a-z]+=|=~)",
        )
        .ok()
    })
    .as_ref()
}

fn already_quoted() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(==|!=)\s*['"]"#).ok()).as_ref()
}

fn found(re: Option<&Regex>, text: &str) -> bool {
    re.map_or(false, |re| re.is_match(text))
}

fn needs_quoting(value: &str) -> bool {
    value
        .chars()
        .any(|c| matches!(c, ' ' | '\'' | '"' | ';' | ',' | '(' | ')'))
}

/// Convert a single FIQL comparison to RSQL, quoting its value if needed.
pub fn convert_fiql_to_rsql(text: &str) -> Cow<'_, str> {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || trimmed.contains(" and ")
        || trimmed.contains(" or ")
        || found(already_quoted(), trimmed)
        || found(multiple_comparisons(), trimmed)
    {
        return Cow::Borrowed(text);
    }

    let Some(captures) = single_comparison().and_then(|re| re.captures(trimmed)) else {
        return Cow::Borrowed(text);
    };
    let value = &captures[3];
    if !needs_quoting(value) {
        return Cow::Borrowed(text);
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    Cow::Owned(format!("{}{}{}", &captures[1], &captures[2], quoted))
}
