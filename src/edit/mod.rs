//! Documentation edits proposed by the model.
//!
//! The writing agent answers with tagged blocks:
//!
//! ```text
//! <file>src/utils.py</file>
//! <code>
//! def helper(x):
//!     """Return x unchanged."""
//!     return x
//! </code>
//! ```
//!
//! [`parser`] turns such text into [`Edit`] records and [`matcher`] finds
//! where each edit belongs in the working tree and rewrites the file.

pub mod matcher;
pub mod parser;

pub use matcher::{
    apply_edit, apply_to_file, apply_to_text, find_window, resolve_target, MatchOutcome,
    NotMatchedReason,
};
pub use parser::{parse_edits, EditParser};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing or applying edits.
#[derive(Debug, Error)]
pub enum EditError {
    /// A file tag was present but named no path.
    #[error("Edit {index} has an empty file path")]
    EmptyPath { index: usize },

    /// `<original>` was given without a matching `<patched>` block.
    #[error("Edit {index} has an <original> block without a <patched> block")]
    MissingPatched { index: usize },

    /// Reading or writing a target file failed.
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One edit extracted from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// Path as written by the model; may omit leading directories.
    pub target_path: String,
    /// Verbatim text to place in the file.
    pub content: String,
    /// Text to locate when it differs from `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
}

impl Edit {
    /// Create an edit whose content is both the match key and the replacement.
    pub fn new(target_path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            target_path: target_path.into(),
            content: content.into(),
            original: None,
        }
    }

    /// Create an edit that replaces `original` with `patched`.
    pub fn replacing(
        target_path: impl Into<String>,
        original: impl Into<String>,
        patched: impl Into<String>,
    ) -> Self {
        Self {
            target_path: target_path.into(),
            content: patched.into(),
            original: Some(original.into()),
        }
    }

    /// Text used to locate the target region.
    pub fn match_key(&self) -> &str {
        self.original.as_deref().unwrap_or(&self.content)
    }

    /// Whether the declared original text is empty or whitespace only.
    pub fn has_empty_origin(&self) -> bool {
        self.match_key().trim().is_empty()
    }
}

impl std::fmt::Display for Edit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.target_path)?;
        if let Some(original) = &self.original {
            writeln!(f, "Original:\n{}", original)?;
        }
        write!(f, "Result:\n{}", self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_key_defaults_to_content() {
        let edit = Edit::new("a.py", "x = 1");
        assert_eq!(edit.match_key(), "x = 1");
        assert!(!edit.has_empty_origin());
    }

    #[test]
    fn test_replacing_edit_uses_original_as_key() {
        let edit = Edit::replacing("a.py", "  \n", "# header");
        assert_eq!(edit.match_key(), "  \n");
        assert_eq!(edit.content, "# header");
        assert!(edit.has_empty_origin());
    }

    #[test]
    fn test_edit_serialization_skips_missing_original() {
        let json = serde_json::to_string(&Edit::new("a.py", "x")).unwrap();
        assert!(!json.contains("original"));
        let parsed: Edit = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Edit::new("a.py", "x"));
    }
}
