//! The documentation-writing step and its retry loop.
//!
//! The writer sees a cleaned copy of the main conversation: the README and the
//! tool results, without the search chatter that biases the model towards
//! more API calls. Each attempt is classified and appended to the task's
//! status history; the loop stops at the first `FINISHED` attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::agent_loop::OrchestratorError;
use super::prompts::{
    retry_prompt, README_OPEN_TAG, TOOL_RESULT_PREFIX, WRITER_SYSTEM_PROMPT, WRITER_USER_PROMPT,
};
use super::thread::MessageThread;
use crate::extraction::{
    diff_file_name, final_diff_path, raw_output_file_name, ExtractionClassifier, ExtractionStatus,
    StatusHistory,
};
use crate::llm::{generate_text, GenerationRequest, LlmProvider};
use crate::task::Workspace;

/// Configuration for the documentation writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Write attempts per task.
    pub retries: usize,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            model: String::new(),
            temperature: 0.2,
            max_tokens: 8192,
        }
    }
}

impl WriterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Result of the write/extract/classify cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Attempts actually made.
    pub attempts: usize,
    /// Best status over the task's history.
    pub best_status: Option<ExtractionStatus>,
    /// First 1-based attempt that reached the best status.
    pub best_attempt: Option<usize>,
    /// Diff of the finished attempt, if any.
    pub diff_path: Option<PathBuf>,
}

impl WriteOutcome {
    pub fn is_finished(&self) -> bool {
        self.best_status.is_some_and(ExtractionStatus::is_finished)
    }
}

/// Runs write attempts until one finishes or the retries run out.
pub struct RetryDriver {
    llm: Arc<dyn LlmProvider>,
    config: WriterConfig,
}

impl RetryDriver {
    pub fn new(llm: Arc<dyn LlmProvider>, config: WriterConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Writer context built from the main conversation.
    pub fn cleaned_thread(main: &MessageThread) -> MessageThread {
        let mut cleaned = MessageThread::with_system(WRITER_SYSTEM_PROMPT);
        for message in main.messages() {
            if message.role == "user"
                && (message.content.starts_with(README_OPEN_TAG)
                    || message.content.starts_with(TOOL_RESULT_PREFIX))
            {
                cleaned.add_user(message.content.as_str());
            }
        }
        cleaned.add_user(WRITER_USER_PROMPT);
        cleaned
    }

    /// Run the attempts, writing every artifact into `output_dir`.
    pub async fn run(
        &self,
        main: &MessageThread,
        workspace: &dyn Workspace,
        output_dir: &Path,
    ) -> Result<WriteOutcome, OrchestratorError> {
        let history = StatusHistory::new(output_dir);
        let classifier = ExtractionClassifier::new(workspace.project_root());
        let mut thread = Self::cleaned_thread(main);
        let retries = self.config.retries.max(1);
        let mut attempts = 0;

        for attempt in 1..=retries {
            attempts = attempt;
            if attempt > 1 {
                workspace.reset().await?;
            }

            thread.save_to_file(&output_dir.join(format!("agent_write_doc_{}.json", attempt)))?;
            tracing::info!(attempt, retries, "Trying to write documentation");

            let raw_path = output_dir.join(raw_output_file_name(attempt));
            let request = GenerationRequest::new(self.config.model.clone(), thread.to_messages())
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.config.max_tokens);

            match generate_text(self.llm.as_ref(), request).await {
                Ok(text) => {
                    std::fs::write(&raw_path, &text)?;
                    thread.add_assistant(text);
                }
                Err(e) => tracing::warn!(attempt, error = %e, "Writer call failed"),
            }

            let classification = classifier.classify_file(&raw_path)?;
            history.record(classification.status)?;
            tracing::info!(
                attempt,
                status = %classification.status,
                message = %classification.message,
                "Write attempt classified"
            );

            if classification.status.is_finished() {
                if let Some(diff) = &classification.diff {
                    std::fs::write(output_dir.join(diff_file_name(attempt)), diff)?;
                }
                break;
            }

            if attempt < retries {
                thread.add_user(retry_prompt(classification.status, &classification.message));
            }
        }

        let best = history.best()?;
        Ok(WriteOutcome {
            attempts,
            best_status: best.map(|(status, _)| status),
            best_attempt: best.map(|(_, attempt)| attempt),
            diff_path: final_diff_path(output_dir)?,
        })
    }
}
