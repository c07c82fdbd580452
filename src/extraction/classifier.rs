//! Turns one raw model answer into an [`ExtractionStatus`].
//!
//! The classifier parses the answer, applies every edit to the project tree,
//! diffs each touched file against its snapshot and picks the status. Edits
//! are not rolled back on failure; resetting the tree between attempts is the
//! caller's job.

use similar::TextDiff;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{ExtractionError, ExtractionStatus};
use crate::edit::{apply_to_file, parse_edits, resolve_target, Edit, MatchOutcome};

/// Lines of context around each diff hunk.
const DIFF_CONTEXT: usize = 3;

/// Outcome of classifying one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Status assigned to the attempt.
    pub status: ExtractionStatus,
    /// Human-readable explanation, suitable as model feedback.
    pub message: String,
    /// Aggregate unified diff, present only for `FINISHED`.
    pub diff: Option<String>,
    /// 1-based indices of edits that matched.
    pub applied: Vec<usize>,
    /// 1-based indices of edits that did not match.
    pub unmatched: Vec<usize>,
}

impl Classification {
    fn bare(status: ExtractionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            diff: None,
            applied: Vec::new(),
            unmatched: Vec::new(),
        }
    }
}

/// Classifies attempts against one project tree.
#[derive(Debug, Clone)]
pub struct ExtractionClassifier {
    project_root: PathBuf,
}

impl ExtractionClassifier {
    /// Create a classifier that applies edits under `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Root the edits are applied under.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Classify the raw answer stored at `raw_path`.
    pub fn classify_file(&self, raw_path: &Path) -> Result<Classification, ExtractionError> {
        if !raw_path.is_file() {
            return Ok(Classification::bare(
                ExtractionStatus::NoEdits,
                "No documentation was produced.",
            ));
        }
        let raw = std::fs::read_to_string(raw_path)?;
        self.classify_text(&raw)
    }

    /// Classify raw answer text.
    pub fn classify_text(&self, raw: &str) -> Result<Classification, ExtractionError> {
        if raw.trim().is_empty() {
            return Ok(Classification::bare(
                ExtractionStatus::RawTextProduced,
                "The answer was empty.",
            ));
        }

        let edits = match parse_edits(raw) {
            Ok(edits) if edits.is_empty() => {
                return Ok(Classification::bare(
                    ExtractionStatus::EditsUnparseable,
                    "No <file>...</file> and <code>...</code> pairs were found in the answer.",
                ));
            }
            Ok(edits) => edits,
            Err(e) => {
                return Ok(Classification::bare(
                    ExtractionStatus::EditsUnparseable,
                    format!("The edits could not be parsed: {}", e),
                ));
            }
        };

        let mut snapshots: BTreeMap<PathBuf, String> = BTreeMap::new();
        let mut applied = Vec::new();
        let mut unmatched = Vec::new();
        let mut empty_origin = false;

        for (i, edit) in edits.iter().enumerate() {
            let index = i + 1;
            if self.apply_one(edit, &mut snapshots) {
                applied.push(index);
                empty_origin |= edit.has_empty_origin();
            } else {
                unmatched.push(index);
            }
        }

        if applied.is_empty() {
            return Ok(Classification {
                message: format!(
                    "None of the {} edits could be matched to the original code. {}",
                    edits.len(),
                    unmatched_note(&unmatched)
                ),
                unmatched,
                ..Classification::bare(ExtractionStatus::EditsUnmatched, "")
            });
        }

        let diff = self.aggregate_diff(&snapshots)?;
        let (status, summary) = if diff.trim().is_empty() {
            (
                ExtractionStatus::MatchedEmptyDiff,
                "The edits matched the code but changed nothing.".to_string(),
            )
        } else if empty_origin {
            (
                ExtractionStatus::MatchedEmptyOrigin,
                "An edit declared empty original code, so its location is unknown.".to_string(),
            )
        } else {
            (
                ExtractionStatus::Finished,
                format!("Applied {} of {} edits.", applied.len(), edits.len()),
            )
        };

        let message = if unmatched.is_empty() {
            summary
        } else {
            format!("{} {}", summary, unmatched_note(&unmatched))
        };

        tracing::debug!(
            %status,
            applied = applied.len(),
            unmatched = unmatched.len(),
            "Classified extraction attempt"
        );

        Ok(Classification {
            status,
            message,
            diff: status.is_finished().then_some(diff),
            applied,
            unmatched,
        })
    }

    /// Resolve, snapshot and apply one edit. Returns whether it landed.
    fn apply_one(&self, edit: &Edit, snapshots: &mut BTreeMap<PathBuf, String>) -> bool {
        let path = match resolve_target(&self.project_root, &edit.target_path) {
            Ok(path) => path,
            Err(reason) => {
                tracing::debug!(target_path = %edit.target_path, %reason, "Edit not matched");
                return false;
            }
        };

        if !snapshots.contains_key(&path) {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    snapshots.insert(path.clone(), content);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Cannot read edit target");
                    return false;
                }
            }
        }

        match apply_to_file(&path, edit) {
            Ok(MatchOutcome::Applied { .. }) => true,
            Ok(MatchOutcome::NotMatched(_)) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to apply edit");
                false
            }
        }
    }

    fn aggregate_diff(
        &self,
        snapshots: &BTreeMap<PathBuf, String>,
    ) -> Result<String, ExtractionError> {
        let mut out = String::new();
        for (path, before) in snapshots {
            let after = std::fs::read_to_string(path)?;
            if *before == after {
                continue;
            }
            let rel = path
                .strip_prefix(&self.project_root)
                .unwrap_or(path)
                .display()
                .to_string();
            let diff = TextDiff::from_lines(before.as_str(), after.as_str());
            out.push_str(
                &diff
                    .unified_diff()
                    .context_radius(DIFF_CONTEXT)
                    .header(&format!("a/{}", rel), &format!("b/{}", rel))
                    .to_string(),
            );
        }
        Ok(out)
    }
}

fn unmatched_note(unmatched: &[usize]) -> String {
    let list = unmatched
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("Unmatched edits: {}.", list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("calc.py"),
            "def add(a, b):\n    return a + b\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_missing_raw_file_is_no_edits() {
        let dir = project();
        let classifier = ExtractionClassifier::new(dir.path());
        let result = classifier
            .classify_file(&dir.path().join("agent_doc_raw_1.md"))
            .unwrap();
        assert_eq!(result.status, ExtractionStatus::NoEdits);
    }

    #[test]
    fn test_blank_text_is_raw_text_produced() {
        let dir = project();
        let classifier = ExtractionClassifier::new(dir.path());
        let result = classifier.classify_text("  \n\t").unwrap();
        assert_eq!(result.status, ExtractionStatus::RawTextProduced);
    }

    #[test]
    fn test_parse_error_is_unparseable() {
        let dir = project();
        let classifier = ExtractionClassifier::new(dir.path());
        let result = classifier
            .classify_text("<file>calc.py</file><code><original>x</original></code>")
            .unwrap();
        assert_eq!(result.status, ExtractionStatus::EditsUnparseable);
    }

    #[test]
    fn test_identical_content_is_empty_diff() {
        let dir = project();
        let classifier = ExtractionClassifier::new(dir.path());
        let result = classifier
            .classify_text("<file>calc.py</file><code>\ndef add(a, b):\n</code>")
            .unwrap();
        assert_eq!(result.status, ExtractionStatus::MatchedEmptyDiff);
        assert!(result.diff.is_none());
    }

    #[test]
    fn test_empty_original_is_empty_origin() {
        let dir = project();
        let classifier = ExtractionClassifier::new(dir.path());
        let raw = "<file>calc.py</file><code><original>\n</original><patched>\"\"\"Math helpers.\"\"\"</patched></code>";
        let result = classifier.classify_text(raw).unwrap();
        assert_eq!(result.status, ExtractionStatus::MatchedEmptyOrigin);
        assert_eq!(result.applied, vec![1]);
    }

    #[test]
    fn test_finished_produces_diff() {
        let dir = project();
        let classifier = ExtractionClassifier::new(dir.path());
        let raw = "<file>calc.py</file><code><original>def add(a, b):</original><patched>def add(a, b):\n    \"\"\"Add two numbers.\"\"\"</patched></code>";
        let result = classifier.classify_text(raw).unwrap();
        assert_eq!(result.status, ExtractionStatus::Finished);
        let diff = result.diff.unwrap();
        assert!(diff.contains("--- a/calc.py"));
        assert!(diff.contains("+    \"\"\"Add two numbers.\"\"\""));
    }

    #[test]
    fn test_two_edits_to_same_file_diff_once() {
        let dir = project();
        let classifier = ExtractionClassifier::new(dir.path());
        let raw = "<file>calc.py</file><code><original>def add(a, b):</original><patched># add\ndef add(a, b):</patched></code>\
                   <file>calc.py</file><code><original>return a + b</original><patched>return a + b  # sum</patched></code>";
        let result = classifier.classify_text(raw).unwrap();
        assert_eq!(result.status, ExtractionStatus::Finished);
        assert_eq!(result.applied, vec![1, 2]);
        assert_eq!(result.diff.unwrap().matches("--- a/calc.py").count(), 1);
    }
}
