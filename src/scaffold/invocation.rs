//! Parsing of pseudo-call expressions such as `search_method_in_file("run", "app/main.py")`.
//!
//! Arguments are positional. Each one is a quoted string (single or double
//! quotes, backslash escapes) or a bare token. A `keyword=` prefix is
//! accepted and dropped, since only the position matters.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

static KEYWORD_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\s*=\s*").expect("valid keyword prefix regex")
});

/// Why a call expression could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallParseError {
    #[error("Empty call expression")]
    Empty,

    #[error("`{0}` is not of the form name(arg, ...)")]
    NotACall(String),

    #[error("Invalid function name `{0}`")]
    InvalidName(String),

    #[error("Unterminated string literal in `{0}`")]
    UnterminatedString(String),

    #[error("Unbalanced parentheses in `{0}`")]
    Unbalanced(String),

    #[error("Unexpected text after the closing parenthesis in `{0}`")]
    TrailingText(String),

    #[error("Empty argument at position {position} in `{expr}`")]
    EmptyArgument { expr: String, position: usize },
}

/// A call expression split into its name and positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCall {
    pub name: String,
    pub args: Vec<String>,
}

/// Parse `name(arg, ...)`.
pub fn parse_call(expr: &str) -> Result<ParsedCall, CallParseError> {
    let expr = expr.trim().trim_matches('`').trim().trim_end_matches(';').trim();
    if expr.is_empty() {
        return Err(CallParseError::Empty);
    }

    let open = expr
        .find('(')
        .ok_or_else(|| CallParseError::NotACall(expr.to_string()))?;
    let name = expr[..open].trim();
    if !IDENTIFIER.is_match(name) {
        return Err(CallParseError::InvalidName(name.to_string()));
    }

    let body_start = open + 1;
    let mut raw_args: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut close = None;

    for (i, c) in expr[body_start..].char_indices() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' if depth == 0 => {
                close = Some(body_start + i);
                break;
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => raw_args.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(CallParseError::UnterminatedString(expr.to_string()));
    }
    let close = close.ok_or_else(|| CallParseError::Unbalanced(expr.to_string()))?;
    if !expr[close + 1..].trim().is_empty() {
        return Err(CallParseError::TrailingText(expr.to_string()));
    }

    raw_args.push(current);
    // `f()` and a trailing comma both leave one empty slot at the end.
    if raw_args.last().is_some_and(|a| a.trim().is_empty()) {
        raw_args.pop();
    }

    let args = raw_args
        .iter()
        .enumerate()
        .map(|(position, raw)| {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(CallParseError::EmptyArgument {
                    expr: expr.to_string(),
                    position: position + 1,
                });
            }
            Ok(argument_value(raw))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedCall {
        name: name.to_string(),
        args,
    })
}

fn argument_value(raw: &str) -> String {
    let value = match KEYWORD_PREFIX.find(raw) {
        // `a == b` is an expression, not a keyword argument.
        Some(m) if !raw[m.end()..].starts_with('=') => &raw[m.end()..],
        _ => raw,
    };
    unquote(value).unwrap_or_else(|| value.to_string())
}

fn unquote(value: &str) -> Option<String> {
    let mut chars = value.chars();
    let first = chars.next()?;
    if !(first == '"' || first == '\'') || value.len() < 2 || !value.ends_with(first) {
        return None;
    }

    let inner = &value[1..value.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut iter = inner.chars();
    while let Some(c) = iter.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match iter.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Some(out)
}
