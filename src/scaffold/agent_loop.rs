//! Conversation loop of the context-gathering agent.
//!
//! Each round:
//! 1. Checkpoints the thread
//! 2. Gets the agent's free-text answer
//! 3. Extracts and validates tool calls through the proxy
//! 4. Dispatches the calls and feeds the results back
//! 5. Asks the agent to analyze them and decide on the next step
//!
//! The loop ends when the agent declares it is finished or the round budget
//! runs out. Either way the documentation writer then runs exactly once.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::layers::{ToolCallLog, ToolCallRecord};
use super::prompts::{
    context_retrieval_prompt, next_step_prompt_for, AGENT_SYSTEM_PROMPT, ANALYZE_PROMPT,
    INVALID_CALLS_PROMPT, NEXT_STEP_PROMPT,
};
use super::proxy::{ProxyConfig, ProxyOutcome, ToolCallValidator, ValidationPolicy};
use super::thread::MessageThread;
use super::tools::{dispatch, CapabilityRegistry, CodeSearch, ToolCallIntent, WRITE_DOC};
use super::writer::{RetryDriver, WriteOutcome, WriterConfig};
use crate::error::TaskError;
use crate::extraction::{ExtractionError, ExtractionStatus};
use crate::llm::{generate_text, GenerationRequest, LlmProvider};
use crate::task::Workspace;

/// Errors that stop a task run.
///
/// Model and validation failures are not errors: they are fed back into the
/// conversation. Only local I/O and checkout problems end a run early.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

/// Configuration for the conversation loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Context rounds before writing is forced.
    pub round_limit: usize,
    /// Model for the main agent; empty means the provider default.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// One call per round, restricted by the capability adjacency table.
    pub state_machine: bool,
    pub proxy: ProxyConfig,
    pub writer: WriterConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            round_limit: 15,
            model: String::new(),
            temperature: 0.2,
            max_tokens: 4096,
            state_machine: false,
            proxy: ProxyConfig::default(),
            writer: WriterConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_round_limit(mut self, round_limit: usize) -> Self {
        self.round_limit = round_limit;
        self
    }

    /// Use `model` for the agent, the proxy and the writer.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.proxy.model = model.clone();
        self.writer.model = model.clone();
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self.writer.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_state_machine(mut self, state_machine: bool) -> Self {
        self.state_machine = state_machine;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }
}

/// Where the conversation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    AwaitingContext,
    Finishing,
}

/// Summary of one task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Context rounds that were started.
    pub rounds_used: usize,
    /// Whether the round budget ran out before the agent finished.
    pub forced_finish: bool,
    pub write_attempts: usize,
    pub best_status: Option<ExtractionStatus>,
    pub best_attempt: Option<usize>,
}

impl RunOutcome {
    pub fn is_finished(&self) -> bool {
        self.best_status.is_some_and(ExtractionStatus::is_finished)
    }
}

/// Drives the context-gathering conversation and the final write.
pub struct ConversationOrchestrator {
    llm: Arc<dyn LlmProvider>,
    validator: ToolCallValidator,
    writer: RetryDriver,
    registry: CapabilityRegistry,
    config: OrchestratorConfig,
}

impl ConversationOrchestrator {
    /// Use one provider for the agent, the proxy and the writer.
    pub fn new(llm: Arc<dyn LlmProvider>, config: OrchestratorConfig) -> Self {
        Self {
            validator: ToolCallValidator::new(llm.clone(), config.proxy.clone()),
            writer: RetryDriver::new(llm.clone(), config.writer.clone()),
            registry: CapabilityRegistry::new(),
            llm,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Initial thread: system prompt, README prompt, retrieval instructions.
    pub fn initial_thread(&self, readme_prompt: &str) -> MessageThread {
        let first_tools = if self.config.state_machine {
            self.registry.next_tools(None)
        } else {
            self.registry.search_tools()
        };

        let mut thread = MessageThread::with_system(AGENT_SYSTEM_PROMPT);
        thread.add_user(readme_prompt);
        thread.add_user(context_retrieval_prompt(
            &self.registry.prompt_listing(&first_tools),
            self.config.state_machine,
        ));
        thread
    }

    /// Run one task end to end, writing every artifact into `output_dir`.
    pub async fn run(
        &self,
        readme_prompt: &str,
        search: &dyn CodeSearch,
        workspace: &dyn Workspace,
        output_dir: &Path,
    ) -> Result<RunOutcome, OrchestratorError> {
        std::fs::create_dir_all(output_dir)?;

        let mut thread = self.initial_thread(readme_prompt);
        let mut log = ToolCallLog::new();
        let mut state = OrchestratorState::AwaitingContext;
        let mut previous_tool: Option<String> = None;
        let mut rounds_used = 0;

        for round in 1..=self.config.round_limit {
            rounds_used = round;
            log.open(round);
            thread.save_to_file(&output_dir.join(format!("conversation_round_{}.json", round)))?;
            tracing::info!(round, limit = self.config.round_limit, "Context retrieval round");

            let reply = match self.ask(&thread).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(round, error = %e, "Agent call failed");
                    thread.add_user(INVALID_CALLS_PROMPT);
                    continue;
                }
            };
            thread.add_assistant(reply.as_str());

            let policy = self.policy(previous_tool.as_deref());
            let proxy_run = self.validator.run(&reply, &policy).await;
            std::fs::write(
                output_dir.join(format!("agent_proxy_{}.json", round)),
                serde_json::to_string_pretty(&proxy_run.threads)?,
            )?;

            let result = match proxy_run.outcome {
                ProxyOutcome::Selected(result) => result,
                ProxyOutcome::NoUsableResult => {
                    tracing::info!(round, "No usable tool calls");
                    thread.add_user(INVALID_CALLS_PROMPT);
                    continue;
                }
            };
            log.current().proxy_valid = true;

            if result.is_finish_only() {
                tracing::info!(round, "Gathered enough information, writing documentation");
                state = OrchestratorState::Finishing;
                log.current().finished = true;
                break;
            }

            if result.intents.iter().any(|i| i.function_name == WRITE_DOC) {
                tracing::info!(round, "write_doc requested, writing documentation");
                state = OrchestratorState::Finishing;
                log.current().finished = true;
                break;
            }

            let collated = self.dispatch_all(search, &result.intents, &mut log);
            previous_tool = result.intents.last().map(|i| i.function_name.clone());
            thread.add_user(collated);

            thread.add_user(ANALYZE_PROMPT);
            match self.ask(&thread).await {
                Ok(analysis) => thread.add_assistant(analysis),
                Err(e) => tracing::warn!(round, error = %e, "Analysis call failed"),
            }

            if round < self.config.round_limit {
                thread.add_user(self.next_step_prompt(previous_tool.as_deref()));
            }
        }

        let forced_finish = state == OrchestratorState::AwaitingContext;
        if forced_finish {
            tracing::info!(rounds = rounds_used, "Round limit reached, writing documentation anyway");
        }

        let write = self.finish(&thread, workspace, output_dir, rounds_used, &mut log).await;
        log.save(output_dir)?;
        let write = write?;

        Ok(RunOutcome {
            rounds_used,
            forced_finish,
            write_attempts: write.attempts,
            best_status: write.best_status,
            best_attempt: write.best_attempt,
        })
    }

    async fn ask(&self, thread: &MessageThread) -> Result<String, crate::error::LlmError> {
        let request = GenerationRequest::new(self.config.model.clone(), thread.to_messages())
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);
        generate_text(self.llm.as_ref(), request).await
    }

    fn policy(&self, previous_tool: Option<&str>) -> ValidationPolicy {
        if self.config.state_machine {
            ValidationPolicy::state_machine(&self.registry, previous_tool)
        } else {
            ValidationPolicy::stratified(&self.registry)
        }
    }

    fn next_step_prompt(&self, previous_tool: Option<&str>) -> String {
        if self.config.state_machine {
            let next = self.registry.next_tools(previous_tool);
            next_step_prompt_for(&self.registry.prompt_listing(&next))
        } else {
            NEXT_STEP_PROMPT.to_string()
        }
    }

    /// Run every call and collate the results keyed by the call expression.
    fn dispatch_all(
        &self,
        search: &dyn CodeSearch,
        intents: &[ToolCallIntent],
        log: &mut ToolCallLog,
    ) -> String {
        let mut collated = String::new();
        for intent in intents {
            let output = dispatch(search, intent);
            tracing::debug!(call = %intent.call, ok = output.ok, summary = %output.summary, "Dispatched");
            log.record(ToolCallRecord::from_intent(intent, output.ok));
            collated.push_str(&format!(
                "Result of {}:\n\n{}\n\n",
                intent.call, output.content
            ));
        }
        collated
    }

    /// The write layer: record the `write_doc` call and run the writer once.
    async fn finish(
        &self,
        thread: &MessageThread,
        workspace: &dyn Workspace,
        output_dir: &Path,
        rounds_used: usize,
        log: &mut ToolCallLog,
    ) -> Result<WriteOutcome, OrchestratorError> {
        let write_round = rounds_used + 1;
        log.open(write_round);
        log.current().finished = true;

        let result = self.writer.run(thread, workspace, output_dir).await;
        log.record(ToolCallRecord {
            func_name: WRITE_DOC.to_string(),
            arguments: Default::default(),
            call_ok: result.is_ok(),
            correlation_id: Some(uuid::Uuid::new_v4()),
        });
        let outcome = result?;

        thread.save_to_file(&output_dir.join(format!("conversation_round_{}.json", write_round)))?;
        tracing::info!(
            attempts = outcome.attempts,
            status = ?outcome.best_status,
            "Documentation writing done"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse, Message, ResponseFormat, Usage};
    use crate::scaffold::prompts::WRITER_SYSTEM_PROMPT;
    use crate::scaffold::tools::LocalCodeSearch;
    use crate::task::GitWorkspace;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies per caller: the agent, the proxy (JSON mode) and the writer.
    struct RoutingMockLlm {
        agent: Mutex<Vec<String>>,
        proxy: Mutex<Vec<String>>,
        writer: Mutex<Vec<String>>,
        agent_calls: AtomicUsize,
        proxy_calls: AtomicUsize,
        writer_calls: AtomicUsize,
    }

    impl RoutingMockLlm {
        fn new(agent: &[&str], proxy: &[&str], writer: &[&str]) -> Self {
            let owned = |v: &[&str]| Mutex::new(v.iter().map(|s| s.to_string()).collect());
            Self {
                agent: owned(agent),
                proxy: owned(proxy),
                writer: owned(writer),
                agent_calls: AtomicUsize::new(0),
                proxy_calls: AtomicUsize::new(0),
                writer_calls: AtomicUsize::new(0),
            }
        }

        fn pick(list: &Mutex<Vec<String>>, counter: &AtomicUsize) -> String {
            let idx = counter.fetch_add(1, Ordering::SeqCst);
            let list = list.lock().expect("lock not poisoned");
            list.get(idx)
                .or_else(|| list.last())
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmProvider for RoutingMockLlm {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            let content = if request.response_format == ResponseFormat::JsonObject {
                Self::pick(&self.proxy, &self.proxy_calls)
            } else if request.messages[0].content == WRITER_SYSTEM_PROMPT {
                Self::pick(&self.writer, &self.writer_calls)
            } else {
                Self::pick(&self.agent, &self.agent_calls)
            };

            Ok(GenerationResponse {
                id: "mock".to_string(),
                model: "mock-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage {
                    prompt_tokens: 100,
                    completion_tokens: 200,
                    total_tokens: 300,
                },
            })
        }
    }

    const SOURCE: &str = "class Circle:\n    def area(self):\n        return 3.14 * self.r ** 2\n";

    const DOCUMENTED: &str = "<file>shapes.py</file>\n<code>\n<original>\n    def area(self):\n</original>\n<patched>\n    def area(self):\n        \"\"\"Area of the circle.\"\"\"\n</patched>\n</code>";

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("shapes.py"), SOURCE).unwrap();
        dir
    }

    fn orchestrator(mock: Arc<RoutingMockLlm>, config: OrchestratorConfig) -> ConversationOrchestrator {
        ConversationOrchestrator::new(mock, config.with_proxy(ProxyConfig::new().with_retries(2)))
    }

    #[test]
    fn test_config_defaults_and_builder() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.round_limit, 15);
        assert_eq!(config.proxy.retries, 5);
        assert_eq!(config.writer.retries, 3);
        assert!(!config.state_machine);

        let config = OrchestratorConfig::new()
            .with_round_limit(3)
            .with_model("gpt-4")
            .with_state_machine(true);
        assert_eq!(config.round_limit, 3);
        assert_eq!(config.proxy.model, "gpt-4");
        assert_eq!(config.writer.model, "gpt-4");
        assert!(config.state_machine);
    }

    #[tokio::test]
    async fn test_calls_then_finish() {
        let project = project();
        let output = TempDir::new().unwrap();
        let mock = Arc::new(RoutingMockLlm::new(
            &["Let me look at Circle.", "Circle has an area method.", "I have enough."],
            &[
                r#"{"API_calls": ["search_class(\"Circle\")"], "Finish": [0]}"#,
                r#"{"API_calls": [], "Finish": [1]}"#,
            ],
            &[DOCUMENTED],
        ));
        let orchestrator = orchestrator(mock.clone(), OrchestratorConfig::new());
        let search = LocalCodeSearch::new(project.path());
        let workspace = GitWorkspace::new(project.path(), None);

        let outcome = orchestrator
            .run("<read>\nREADME file:\nShapes\n</read>", &search, &workspace, output.path())
            .await
            .unwrap();

        assert_eq!(outcome.rounds_used, 2);
        assert!(!outcome.forced_finish);
        assert_eq!(outcome.best_status, Some(ExtractionStatus::Finished));
        assert!(outcome.is_finished());
        assert_eq!(mock.writer_calls.load(Ordering::SeqCst), 1);

        // Round 2 checkpoint holds the collated result and the analysis.
        let round2 = MessageThread::load_from_file(&output.path().join("conversation_round_2.json"))
            .unwrap();
        let result = round2
            .messages()
            .iter()
            .find(|m| m.content.starts_with("Result of search_class(\"Circle\"):"))
            .unwrap();
        assert!(result.content.contains("class Circle:"));
        assert!(round2.messages().iter().any(|m| m.content == ANALYZE_PROMPT));

        assert!(output.path().join("agent_proxy_1.json").exists());
        assert!(output.path().join("conversation_round_3.json").exists());
        assert!(output.path().join("extracted_doc_1.diff").exists());

        let layers: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(output.path().join("tool_call_layers.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(layers[0]["calls"][0]["func_name"], "search_class");
        assert_eq!(layers[1]["finished"], true);
        assert_eq!(layers[2]["calls"][0]["func_name"], "write_doc");
    }

    #[tokio::test]
    async fn test_invalid_rounds_force_finish() {
        let project = project();
        let output = TempDir::new().unwrap();
        let mock = Arc::new(RoutingMockLlm::new(
            &["I am not sure what to do."],
            &[r#"{"API_calls": [], "Finish": [0]}"#],
            &["no edits here"],
        ));
        let orchestrator = orchestrator(
            mock.clone(),
            OrchestratorConfig::new()
                .with_round_limit(3)
                .with_writer(WriterConfig::new().with_retries(1)),
        );
        let search = LocalCodeSearch::new(project.path());
        let workspace = GitWorkspace::new(project.path(), None);

        let outcome = orchestrator
            .run("<read>\nREADME file:\nShapes\n</read>", &search, &workspace, output.path())
            .await
            .unwrap();

        assert_eq!(outcome.rounds_used, 3);
        assert!(outcome.forced_finish);
        assert_eq!(outcome.write_attempts, 1);
        assert_eq!(outcome.best_status, Some(ExtractionStatus::EditsUnparseable));
        assert_eq!(mock.agent_calls.load(Ordering::SeqCst), 3);
        assert_eq!(mock.proxy_calls.load(Ordering::SeqCst), 6);
        assert_eq!(mock.writer_calls.load(Ordering::SeqCst), 1);

        let last = MessageThread::load_from_file(&output.path().join("conversation_round_4.json"))
            .unwrap();
        let corrections = last
            .messages()
            .iter()
            .filter(|m| m.content == INVALID_CALLS_PROMPT)
            .count();
        assert_eq!(corrections, 3);
    }

    #[tokio::test]
    async fn test_state_machine_write_doc_finishes() {
        let project = project();
        let output = TempDir::new().unwrap();
        let mock = Arc::new(RoutingMockLlm::new(
            &["Search area.", "Done searching.", "Write now."],
            &[
                r#"{"calls": ["search_method(\"area\")"], "finished": 0}"#,
                r#"{"calls": ["write_doc()"], "finished": 1}"#,
            ],
            &[DOCUMENTED],
        ));
        let orchestrator = orchestrator(
            mock.clone(),
            OrchestratorConfig::new().with_state_machine(true),
        );
        let search = LocalCodeSearch::new(project.path());
        let workspace = GitWorkspace::new(project.path(), None);

        let outcome = orchestrator
            .run("<read>\nREADME file:\nShapes\n</read>", &search, &workspace, output.path())
            .await
            .unwrap();

        assert_eq!(outcome.rounds_used, 2);
        assert!(!outcome.forced_finish);
        assert!(outcome.is_finished());
    }

    /// A checkout whose reset always fails.
    struct BrokenWorkspace(std::path::PathBuf);

    #[async_trait]
    impl Workspace for BrokenWorkspace {
        fn project_root(&self) -> &Path {
            &self.0
        }

        async fn reset(&self) -> Result<(), TaskError> {
            Err(TaskError::GitFailed {
                command: "git reset --hard HEAD".to_string(),
                stderr: "fatal: index locked".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_writer_failure_still_saves_tool_log() {
        let project = project();
        let output = TempDir::new().unwrap();
        let mock = Arc::new(RoutingMockLlm::new(
            &["Ready."],
            &[r#"{"calls": [], "finished": 1}"#],
            &["no edits here"],
        ));
        let orchestrator = orchestrator(
            mock,
            OrchestratorConfig::new().with_writer(WriterConfig::new().with_retries(2)),
        );
        let search = LocalCodeSearch::new(project.path());
        let workspace = BrokenWorkspace(project.path().to_path_buf());

        let result = orchestrator
            .run("<read>\nREADME file:\nShapes\n</read>", &search, &workspace, output.path())
            .await;
        assert!(matches!(result, Err(OrchestratorError::Task(_))));

        let layers: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(output.path().join("tool_call_layers.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(layers[0]["finished"], true);
        assert_eq!(layers[1]["calls"][0]["func_name"], "write_doc");
        assert_eq!(layers[1]["calls"][0]["call_ok"], false);
    }

    #[test]
    fn test_initial_thread_lists_first_tools() {
        let mock = Arc::new(RoutingMockLlm::new(&[], &[], &[]));
        let orchestrator = orchestrator(mock, OrchestratorConfig::new().with_state_machine(true));
        let thread = orchestrator.initial_thread("<read>\nREADME file:\nx\n</read>");

        assert_eq!(thread.len(), 3);
        let retrieval = thread.last_with_role("user").unwrap();
        assert!(retrieval.contains("search_class(class_name: str)"));
        assert!(!retrieval.contains("write_doc()"));
        assert!(retrieval.contains("exactly one API call"));
    }
}
