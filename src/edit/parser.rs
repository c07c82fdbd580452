//! Extraction of tagged edit blocks from raw model text.
//!
//! A message holds any number of `<file>…</file>` and `<code>…</code>` pairs.
//! The Nth file tag belongs to the Nth code tag; surplus tags of either kind
//! are ignored. A code block may carry a before/after pair instead of plain
//! content:
//!
//! ```text
//! <code>
//! <original>def f():</original>
//! <patched>def f():
//!     """Docstring."""</patched>
//! </code>
//! ```

use regex::Regex;
use std::sync::LazyLock;

use super::{Edit, EditError};

static FILE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<file>(.*?)</file>").expect("valid file tag regex"));

static CODE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<code>(.*?)</code>").expect("valid code tag regex"));

static ORIGINAL_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<original>(.*?)</original>").expect("valid original tag regex")
});

static PATCHED_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<patched>(.*?)</patched>").expect("valid patched tag regex")
});

/// Lines the model writes instead of real code.
static PLACEHOLDER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#+|//+|/\*+|\*|<!--|--)?\s*(?:\.{3}|…)?\s*\(?\s*(?:rest of (?:the )?(?:file|code|class|function|method|module)|remaining (?:code|lines|content)|existing code|other (?:methods|functions)|code omitted|unchanged code)\b.*$",
    )
    .expect("valid placeholder regex")
});

static FENCE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*```[\w+-]*\s*$").expect("valid fence regex"));

/// Stateless parser for edit blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditParser;

impl EditParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self
    }

    /// Parse every file/code pair in `text`, in order of appearance.
    ///
    /// Returns an empty list when the text holds no complete pair.
    pub fn parse(&self, text: &str) -> Result<Vec<Edit>, EditError> {
        let paths = FILE_TAG
            .captures_iter(text)
            .map(|c| c[1].trim().to_string());
        let blocks = CODE_TAG.captures_iter(text).map(|c| c[1].to_string());

        paths
            .zip(blocks)
            .enumerate()
            .map(|(i, (path, block))| build_edit(i + 1, path, &block))
            .collect()
    }
}

/// Parse edits with the default parser.
pub fn parse_edits(text: &str) -> Result<Vec<Edit>, EditError> {
    EditParser::new().parse(text)
}

fn build_edit(index: usize, path: String, block: &str) -> Result<Edit, EditError> {
    if path.is_empty() {
        return Err(EditError::EmptyPath { index });
    }

    match ORIGINAL_TAG.captures(block) {
        Some(original) => {
            let patched = PATCHED_TAG
                .captures(block)
                .ok_or(EditError::MissingPatched { index })?;
            Ok(Edit::replacing(
                path,
                clean_content(&original[1]),
                clean_content(&patched[1]),
            ))
        }
        None => Ok(Edit::new(path, clean_content(block))),
    }
}

/// Drop placeholder lines and markdown fences, then strip surrounding blank
/// lines. Indentation inside the block is never touched.
fn clean_content(block: &str) -> String {
    let mut lines: Vec<&str> = block
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !PLACEHOLDER_LINE.is_match(line))
        .collect();

    trim_blank_edges(&mut lines);

    if lines.first().is_some_and(|l| FENCE_LINE.is_match(l)) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| FENCE_LINE.is_match(l)) {
        lines.pop();
    }

    trim_blank_edges(&mut lines);
    lines.join("\n")
}

fn trim_blank_edges(lines: &mut Vec<&str>) {
    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_pair() {
        let text = "Here is the doc.\n<file> src/app.py </file>\n<code>\n\ndef run():\n    return 1\n\n</code>\nThanks";
        let edits = parse_edits(text).unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].target_path, "src/app.py");
        assert_eq!(edits[0].content, "def run():\n    return 1");
        assert!(edits[0].original.is_none());
    }

    #[test]
    fn test_parse_pairs_positionally() {
        let text = "<file>a.py</file><file>b.py</file>\n<code>A</code>\n<code>B</code>";
        let edits = parse_edits(text).unwrap();
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].target_path, "a.py");
        assert_eq!(edits[0].content, "A");
        assert_eq!(edits[1].target_path, "b.py");
        assert_eq!(edits[1].content, "B");
    }

    #[test]
    fn test_surplus_tags_ignored() {
        let text = "<file>a.py</file><code>A</code><file>b.py</file>";
        let edits = parse_edits(text).unwrap();
        assert_eq!(edits.len(), 1);
    }

    #[test]
    fn test_no_tags_is_empty_not_error() {
        let edits = parse_edits("I could not find anything to document.").unwrap();
        assert!(edits.is_empty());
    }

    #[test]
    fn test_internal_indentation_preserved() {
        let text = "<file>m.py</file><code>\n    def f(self):\n\n        return 2\n</code>";
        let edits = parse_edits(text).unwrap();
        assert_eq!(edits[0].content, "    def f(self):\n\n        return 2");
    }

    #[test]
    fn test_placeholder_lines_discarded() {
        let text = "<file>m.py</file><code>\nimport os\n# ... rest of file omitted ...\n// rest of the code unchanged\nx = 1\n</code>";
        let edits = parse_edits(text).unwrap();
        assert_eq!(edits[0].content, "import os\nx = 1");
    }

    #[test]
    fn test_markdown_fence_stripped() {
        let text = "<file>m.py</file><code>\n```python\nx = 1\n```\n</code>";
        let edits = parse_edits(text).unwrap();
        assert_eq!(edits[0].content, "x = 1");
    }

    #[test]
    fn test_original_patched_block() {
        let text = "<file>m.py</file><code>\n<original>\ndef f():\n</original>\n<patched>\ndef f():\n    \"\"\"Doc.\"\"\"\n</patched>\n</code>";
        let edits = parse_edits(text).unwrap();
        assert_eq!(edits[0].original.as_deref(), Some("def f():"));
        assert_eq!(edits[0].content, "def f():\n    \"\"\"Doc.\"\"\"");
    }

    #[test]
    fn test_original_without_patched_is_error() {
        let text = "<file>m.py</file><code><original>x</original></code>";
        assert!(matches!(
            parse_edits(text),
            Err(EditError::MissingPatched { index: 1 })
        ));
    }

    #[test]
    fn test_empty_path_is_error() {
        let text = "<file>   </file><code>x</code>";
        assert!(matches!(
            parse_edits(text),
            Err(EditError::EmptyPath { index: 1 })
        ));
    }

    #[test]
    fn test_reparse_is_idempotent() {
        let text = "<file>a.py</file><code>\n  x = 1\n</code><file>b.py</file><code>y</code>";
        let parser = EditParser::new();
        assert_eq!(parser.parse(text).unwrap(), parser.parse(text).unwrap());
    }
}
