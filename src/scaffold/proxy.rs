//! Tool call validation through a proxy model.
//!
//! The main agent answers in free text. A second, narrowly prompted model
//! call turns that text into `{"calls": [...], "finished": 0|1}`, which is then
//! checked against the [`CapabilityRegistry`]. A batch is accepted only when
//! every call parses and binds; otherwise the proxy is asked again, up to
//! [`ProxyConfig::retries`] times.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use super::invocation::{parse_call, CallParseError};
use super::prompts::proxy_prompt;
use super::thread::MessageThread;
use super::tools::{CapabilityRegistry, DispatchError, ToolCallIntent, WRITE_DOC};
use crate::llm::{generate_text, GenerationRequest, LlmProvider};
use crate::utils::json_extraction::extract_json_object;

/// Why a proxy reply was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    #[error("JSON is not an object")]
    NotAnObject,

    #[error("Both calls and finished are empty")]
    NothingActionable,

    #[error("Every API call must be a string, got {0}")]
    CallNotString(String),

    #[error("Every API call must be of form api_call(arg1, ..., argn): {call}: {source}")]
    CallParse {
        call: String,
        #[source]
        source: CallParseError,
    },

    #[error("The API call '{call}' is not valid: {source}")]
    Dispatch {
        call: String,
        #[source]
        source: DispatchError,
    },

    #[error("Too many API calls: {found}, at most {max} allowed")]
    TooManyCalls { max: usize, found: usize },

    #[error("Finishing is not allowed yet")]
    FinishNotAllowed,
}

/// Configuration for the proxy model.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy calls per validation before giving up.
    pub retries: usize,
    /// Model to use; empty means the provider default.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            model: String::new(),
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

impl ProxyConfig {
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

/// What a proxy reply may contain in the current round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Capability names the calls may use.
    pub allowed: Vec<&'static str>,
    /// Upper bound on calls per reply.
    pub max_calls: Option<usize>,
    /// Whether `finished` alone is acceptable.
    pub finish_allowed: bool,
}

impl ValidationPolicy {
    /// Batch mode: any number of search calls, finishing always allowed.
    pub fn stratified(registry: &CapabilityRegistry) -> Self {
        Self {
            allowed: registry.search_tools(),
            max_calls: None,
            finish_allowed: true,
        }
    }

    /// State-machine mode: one call chosen from the successors of `previous`.
    pub fn state_machine(registry: &CapabilityRegistry, previous: Option<&str>) -> Self {
        let allowed = registry.next_tools(previous);
        let finish_allowed = allowed.contains(&WRITE_DOC);
        Self {
            allowed,
            max_calls: Some(1),
            finish_allowed,
        }
    }

    pub fn is_single_call(&self) -> bool {
        self.max_calls == Some(1)
    }
}

/// The decoded proxy object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySelection {
    pub calls: Vec<String>,
    pub finished: bool,
}

impl ProxySelection {
    /// Decode a proxy reply.
    ///
    /// Accepts `calls` or `API_calls`, and `finished` or `Finish` given as a
    /// number, a bool, a string or a list whose first element decides.
    pub fn parse(reply: &str) -> Result<Self, ValidationError> {
        let json =
            extract_json_object(reply).map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
        let value: Value =
            serde_json::from_str(&json).map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let calls = match object.get("calls").or_else(|| object.get("API_calls")) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(call)) if call.trim().is_empty() => Vec::new(),
            Some(Value::String(call)) => vec![call.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(call) => Ok(call.clone()),
                    other => Err(ValidationError::CallNotString(other.to_string())),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => return Err(ValidationError::CallNotString(other.to_string())),
        };

        let finished = object
            .get("finished")
            .or_else(|| object.get("Finish"))
            .is_some_and(is_truthy);

        let selection = Self { calls, finished };
        if selection.calls.is_empty() && !selection.finished {
            return Err(ValidationError::NothingActionable);
        }
        Ok(selection)
    }

    /// Bind every call against `registry` under `policy`.
    ///
    /// One bad call rejects the whole batch.
    pub fn validate(
        &self,
        registry: &CapabilityRegistry,
        policy: &ValidationPolicy,
    ) -> Result<Vec<ToolCallIntent>, ValidationError> {
        if let Some(max) = policy.max_calls {
            if self.calls.len() > max {
                return Err(ValidationError::TooManyCalls {
                    max,
                    found: self.calls.len(),
                });
            }
        }

        if self.calls.is_empty() && self.finished && !policy.finish_allowed {
            return Err(ValidationError::FinishNotAllowed);
        }

        self.calls
            .iter()
            .map(|call| {
                let parsed = parse_call(call).map_err(|source| ValidationError::CallParse {
                    call: call.clone(),
                    source,
                })?;
                registry
                    .bind(&parsed, call, Some(policy.allowed.as_slice()))
                    .map_err(|source| ValidationError::Dispatch {
                        call: call.clone(),
                        source,
                    })
            })
            .collect()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        Value::Array(items) => items.first().is_some_and(is_truthy),
        _ => false,
    }
}

/// An accepted proxy reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResult {
    /// The proxy's reply text.
    pub raw: String,
    pub selection: ProxySelection,
    /// Bound calls, in the order given.
    pub intents: Vec<ToolCallIntent>,
}

impl ProxyResult {
    /// Validated but empty: the agent only declared it is finished.
    pub fn is_finish_only(&self) -> bool {
        self.intents.is_empty()
    }
}

/// Outcome of a full validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOutcome {
    Selected(ProxyResult),
    /// Every proxy try failed.
    NoUsableResult,
}

/// A validation outcome plus every proxy thread, for the audit log.
#[derive(Debug, Clone)]
pub struct ProxyRun {
    pub outcome: ProxyOutcome,
    pub threads: Vec<MessageThread>,
}

/// Extracts and validates tool calls from agent text.
pub struct ToolCallValidator {
    llm: Arc<dyn LlmProvider>,
    registry: CapabilityRegistry,
    config: ProxyConfig,
}

impl ToolCallValidator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ProxyConfig) -> Self {
        Self {
            llm,
            registry: CapabilityRegistry::new(),
            config,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Check one proxy reply.
    pub fn check(
        &self,
        reply: &str,
        policy: &ValidationPolicy,
    ) -> Result<ProxyResult, ValidationError> {
        let selection = ProxySelection::parse(reply)?;
        let intents = selection.validate(&self.registry, policy)?;
        Ok(ProxyResult {
            raw: reply.to_string(),
            selection,
            intents,
        })
    }

    /// Ask the proxy to extract calls from `text`, retrying on bad replies.
    ///
    /// Transport errors count as failed tries.
    pub async fn run(&self, text: &str, policy: &ValidationPolicy) -> ProxyRun {
        let listing = self.registry.prompt_listing(&policy.allowed);
        let schema = serde_json::to_string_pretty(&self.registry.to_json_schema(&policy.allowed))
            .unwrap_or_default();
        let system = proxy_prompt(&listing, &schema, policy.is_single_call());
        let mut threads = Vec::new();

        for attempt in 1..=self.config.retries {
            tracing::debug!(
                attempt,
                retries = self.config.retries,
                "Selecting search APIs in JSON"
            );

            let mut thread = MessageThread::with_system(system.as_str());
            thread.add_user(text);

            let request = GenerationRequest::new(self.config.model.clone(), thread.to_messages())
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.config.max_tokens)
                .json_object();

            let reply = match generate_text(self.llm.as_ref(), request).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Proxy call failed");
                    threads.push(thread);
                    continue;
                }
            };

            thread.add_assistant(reply.as_str());
            threads.push(thread);

            match self.check(&reply, policy) {
                Ok(result) => {
                    tracing::debug!(
                        attempt,
                        calls = result.intents.len(),
                        finished = result.selection.finished,
                        "Extracted valid tool calls"
                    );
                    return ProxyRun {
                        outcome: ProxyOutcome::Selected(result),
                        threads,
                    };
                }
                Err(e) => tracing::debug!(attempt, error = %e, "Invalid proxy reply, retrying"),
            }
        }

        ProxyRun {
            outcome: ProxyOutcome::NoUsableResult,
            threads,
        }
    }
}
