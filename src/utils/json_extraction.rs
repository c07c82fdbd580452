//! JSON extraction from model replies.
//!
//! The proxy model is asked for a bare JSON object, but replies still arrive
//! wrapped in markdown fences or surrounded by prose. Strategies are tried in
//! order:
//! 1. The whole reply is a JSON object
//! 2. A ```json fenced block
//! 3. Any fenced block that holds an object
//! 4. The first balanced `{ ... }` span anywhere in the reply
//!
//! # Example
//!
//! ```
//! use docforge::utils::json_extraction::extract_json_object;
//!
//! let reply = "Sure: {\"calls\": [\"search_class(\\\"A\\\")\"]} done";
//! let json = extract_json_object(reply).unwrap();
//! assert!(json.starts_with('{'));
//! ```

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json\s*\n?(.*?)```").expect("valid json fence regex")
});

static ANY_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*\n?(.*?)```").expect("valid fence regex")
});

const PREVIEW_CHARS: usize = 80;

/// Why no JSON object could be pulled out of a reply.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_braces: usize,
    },
    #[error("No JSON object found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// Extract the first JSON object from `content`.
///
/// The returned text is the object span only; it is not guaranteed to parse.
pub fn extract_json_object(content: &str) -> Result<String, JsonExtractionError> {
    let trimmed = content.trim();

    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            return Ok(trimmed[..=end].to_string());
        }
    }

    if let Some(block) = fenced_object(&JSON_FENCE, trimmed) {
        return Ok(block);
    }
    if let Some(block) = fenced_object(&ANY_FENCE, trimmed) {
        return Ok(block);
    }

    if let Some(start) = trimmed.find('{') {
        let rest = &trimmed[start..];
        return match find_matching_brace(rest) {
            Some(end) => Ok(rest[..=end].to_string()),
            None => Err(JsonExtractionError::Truncated {
                partial_preview: preview(rest),
                unclosed_braces: unclosed_braces(rest),
            }),
        };
    }

    Err(JsonExtractionError::NotFound {
        content_preview: preview(trimmed),
    })
}

/// Index of the `}` closing the `{` that starts `s`.
///
/// Braces inside JSON string literals are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    if !s.starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn fenced_object(fence: &Regex, content: &str) -> Option<String> {
    fence.captures_iter(content).find_map(|caps| {
        let body = caps.get(1)?.as_str().trim();
        let end = find_matching_brace(body)?;
        Some(body[..=end].to_string())
    })
}

fn unclosed_braces(s: &str) -> usize {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

fn preview(s: &str) -> String {
    s.chars().take(PREVIEW_CHARS).collect()
}
