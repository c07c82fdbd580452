//! Error types for docforge operations.
//!
//! Defines the crate-wide error types shared by several subsystems:
//! - LLM API interactions (transport, parsing, rate limits)
//! - Task setup and working-tree management
//!
//! Subsystem-local errors (edit application, extraction, tool dispatch,
//! orchestration) live next to the code that raises them.

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: LITELLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("LLM response contained no choices")]
    EmptyResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while preparing or resetting a task's checkout.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Project path does not exist: {0}")]
    MissingProject(String),

    #[error("Git command `{command}` failed: {stderr}")]
    GitFailed { command: String, stderr: String },

    #[error("Invalid task list: {0}")]
    InvalidTaskList(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
