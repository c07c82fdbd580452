//! Classification of documentation-writing attempts.
//!
//! Each attempt of the writing agent leaves a raw answer on disk. This module
//! turns that answer into an [`ExtractionStatus`], keeps the per-task history
//! of statuses, and names the artifacts an attempt produces.

pub mod classifier;
pub mod history;
pub mod status;

pub use classifier::{Classification, ExtractionClassifier};
pub use history::{final_diff_path, read_best_status, StatusHistory, HISTORY_FILE};
pub use status::ExtractionStatus;

use thiserror::Error;

/// Errors raised while classifying attempts or persisting their history.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid status history: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raw answer of write attempt `attempt`.
pub fn raw_output_file_name(attempt: usize) -> String {
    format!("agent_doc_raw_{}.md", attempt)
}

/// Diff produced by a finished write attempt.
pub fn diff_file_name(attempt: usize) -> String {
    format!("extracted_doc_{}.diff", attempt)
}
