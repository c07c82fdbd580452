//! LLM integration for docforge.
//!
//! The agents only see the [`LlmProvider`] trait and the provider-neutral
//! [`GenerationRequest`]/[`GenerationResponse`] types. Two providers ship with
//! the crate:
//!
//! - [`LiteLlmClient`] for any OpenAI-compatible endpoint (configured from
//!   `LITELLM_API_BASE`, `LITELLM_API_KEY`, `LITELLM_DEFAULT_MODEL`)
//! - [`OpenRouterProvider`] with bounded exponential backoff
//!
//! ```ignore
//! use docforge::llm::{generate_text, GenerationRequest, LiteLlmClient, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello")]).json_object();
//! let text = generate_text(&client, request).await?;
//! ```

pub mod litellm;
pub mod providers;

pub use litellm::{
    generate_text, Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider,
    Message, ResponseFormat, Usage, DEFAULT_MODEL,
};
pub use providers::OpenRouterProvider;
