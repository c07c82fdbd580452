//! Append-only conversation threads with JSON checkpoints.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::llm::Message;

/// Ordered conversation between the agent and the model.
///
/// Messages are only ever appended. The thread serializes as a plain JSON
/// array of messages so checkpoints can be replayed against any
/// OpenAI-compatible endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageThread {
    messages: Vec<Message>,
}

impl MessageThread {
    /// Create an empty thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a thread that starts with a system prompt.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        let mut thread = Self::new();
        thread.add_system(prompt);
        thread
    }

    pub fn add_system(&mut self, content: impl Into<String>) {
        self.messages.push(Message::system(content));
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Append a model reply.
    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Append an arbitrary message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Owned copy of the messages for a generation request.
    pub fn to_messages(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Content of the most recent message with `role`.
    pub fn last_with_role(&self, role: &str) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
    }

    /// Write the thread to `path` as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Read a thread previously written by [`MessageThread::save_to_file`].
    pub fn load_from_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }
}

impl From<Vec<Message>> for MessageThread {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
