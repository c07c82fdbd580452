//! Concrete LLM provider implementations.
//!
//! Each provider implements [`LlmProvider`] and is constructed once, then
//! injected into the agents as `Arc<dyn LlmProvider>`.

pub mod openrouter;

pub use openrouter::OpenRouterProvider;

pub use super::litellm::LlmProvider;
