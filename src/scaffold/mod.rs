//! Agent scaffold: the context-gathering conversation and the writer.
//!
//! The conversation loop:
//! 1. Asks the agent what to look at
//! 2. Turns its answer into validated tool calls through a proxy model
//! 3. Runs the calls against a [`CodeSearch`] backend
//! 4. Feeds the results back until the agent is ready to write
//!
//! The writer then produces documentation edits, which are applied and
//! classified by [`crate::extraction`].
//!
//! # Example
//!
//! ```ignore
//! use docforge::scaffold::{ConversationOrchestrator, LocalCodeSearch, OrchestratorConfig};
//! use docforge::task::GitWorkspace;
//! use docforge::llm::LiteLlmClient;
//!
//! let llm = Arc::new(LiteLlmClient::from_env()?);
//! let orchestrator = ConversationOrchestrator::new(llm, OrchestratorConfig::default());
//! let search = LocalCodeSearch::new("/path/to/project");
//! let workspace = GitWorkspace::new("/path/to/project", None);
//! let outcome = orchestrator.run(&readme_prompt, &search, &workspace, &output_dir).await?;
//! ```

pub mod agent_loop;
pub mod invocation;
pub mod layers;
pub mod prompts;
pub mod proxy;
pub mod thread;
pub mod tools;
pub mod writer;

pub use agent_loop::{
    ConversationOrchestrator, OrchestratorConfig, OrchestratorError, OrchestratorState,
    RunOutcome,
};
pub use invocation::{parse_call, CallParseError, ParsedCall};
pub use layers::{ToolCallLayer, ToolCallLog, ToolCallRecord};
pub use prompts::prepare_readme_prompt;
pub use proxy::{
    ProxyConfig, ProxyOutcome, ProxyResult, ProxyRun, ProxySelection, ToolCallValidator,
    ValidationError, ValidationPolicy,
};
pub use thread::MessageThread;
pub use tools::{
    dispatch, CapabilityRegistry, CapabilitySpec, CodeSearch, DispatchError, LocalCodeSearch,
    SearchOutput, ToolCallIntent, CAPABILITIES, WRITE_DOC,
};
pub use writer::{RetryDriver, WriteOutcome, WriterConfig};
