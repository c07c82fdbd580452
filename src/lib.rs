//! docforge: repository documentation generation with LLM agents.
//!
//! An agent explores a checkout through search tools, then a writer turns the
//! gathered context into documentation edits. Edits are matched against the
//! working tree, applied, and every attempt is classified so the best one can
//! be picked.

// Core modules
pub mod cli;
pub mod edit;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod scaffold;
pub mod task;
pub mod utils;

// Re-export commonly used error types
pub use error::{LlmError, TaskError};
