//! Per-task record of attempt outcomes.
//!
//! Stored as `extract_status.json`:
//!
//! ```json
//! {"extract_status": ["EDITS_UNMATCHED", "FINISHED"]}
//! ```
//!
//! Entry `i` (0-based) belongs to attempt `i + 1`. The list only grows.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{diff_file_name, ExtractionError, ExtractionStatus};

/// File name of the status history inside a task output directory.
pub const HISTORY_FILE: &str = "extract_status.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    extract_status: Vec<ExtractionStatus>,
}

/// Append-only status history bound to one task output directory.
#[derive(Debug, Clone)]
pub struct StatusHistory {
    path: PathBuf,
}

impl StatusHistory {
    /// History stored under `output_dir`.
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            path: output_dir.as_ref().join(HISTORY_FILE),
        }
    }

    /// Location of the history file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All recorded statuses in attempt order. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<ExtractionStatus>, ExtractionError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let file: HistoryFile = serde_json::from_str(&content)?;
        Ok(file.extract_status)
    }

    /// Append `status` and return its 1-based attempt index.
    pub fn record(&self, status: ExtractionStatus) -> Result<usize, ExtractionError> {
        let mut statuses = self.load()?;
        statuses.push(status);

        let file = HistoryFile {
            extract_status: statuses,
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, json)?;

        tracing::debug!(
            attempt = file.extract_status.len(),
            %status,
            path = %self.path.display(),
            "Recorded extraction status"
        );
        Ok(file.extract_status.len())
    }

    /// Best status and the 1-based index of its first occurrence.
    pub fn best(&self) -> Result<Option<(ExtractionStatus, usize)>, ExtractionError> {
        let statuses = self.load()?;
        let Some(best) = ExtractionStatus::best(statuses.iter().copied()) else {
            return Ok(None);
        };
        let index = statuses
            .iter()
            .position(|s| *s == best)
            .map(|i| i + 1)
            .unwrap_or(1);
        Ok(Some((best, index)))
    }
}

/// Best status recorded in `output_dir`, with its first attempt index.
pub fn read_best_status(
    output_dir: &Path,
) -> Result<Option<(ExtractionStatus, usize)>, ExtractionError> {
    StatusHistory::new(output_dir).best()
}

/// Diff of the first finished attempt in `output_dir`, if one was written.
pub fn final_diff_path(output_dir: &Path) -> Result<Option<PathBuf>, ExtractionError> {
    match read_best_status(output_dir)? {
        Some((ExtractionStatus::Finished, index)) => {
            let path = output_dir.join(diff_file_name(index));
            Ok(path.is_file().then_some(path))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_history_is_empty() {
        let dir = TempDir::new().unwrap();
        let history = StatusHistory::new(dir.path());
        assert!(history.load().unwrap().is_empty());
        assert!(history.best().unwrap().is_none());
    }

    #[test]
    fn test_record_appends_in_order() {
        let dir = TempDir::new().unwrap();
        let history = StatusHistory::new(dir.path());

        assert_eq!(history.record(ExtractionStatus::EditsUnmatched).unwrap(), 1);
        assert_eq!(history.record(ExtractionStatus::NoEdits).unwrap(), 2);

        assert_eq!(
            history.load().unwrap(),
            vec![ExtractionStatus::EditsUnmatched, ExtractionStatus::NoEdits]
        );

        let raw = std::fs::read_to_string(history.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["extract_status"][0], "EDITS_UNMATCHED");
        assert_eq!(value["extract_status"][1], "NO_EDITS");
    }

    #[test]
    fn test_best_reports_first_occurrence() {
        let dir = TempDir::new().unwrap();
        let history = StatusHistory::new(dir.path());
        history.record(ExtractionStatus::EditsUnparseable).unwrap();
        history.record(ExtractionStatus::Finished).unwrap();
        history.record(ExtractionStatus::Finished).unwrap();

        assert_eq!(
            read_best_status(dir.path()).unwrap(),
            Some((ExtractionStatus::Finished, 2))
        );
    }

    #[test]
    fn test_final_diff_path() {
        let dir = TempDir::new().unwrap();
        let history = StatusHistory::new(dir.path());
        history.record(ExtractionStatus::MatchedEmptyDiff).unwrap();
        assert!(final_diff_path(dir.path()).unwrap().is_none());

        history.record(ExtractionStatus::Finished).unwrap();
        assert!(final_diff_path(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join("extracted_doc_2.diff"), "--- a\n+++ b\n").unwrap();
        assert_eq!(
            final_diff_path(dir.path()).unwrap(),
            Some(dir.path().join("extracted_doc_2.diff"))
        );
    }
}
