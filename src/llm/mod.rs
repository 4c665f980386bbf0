//! Completion adapter for OpenAI-compatible chat APIs.

pub mod error;
pub mod openrouter;

pub use error::{LlmError, LlmResult};
pub use openrouter::OpenRouterClient;

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::memory::{Message, Role};

/// Boxed future type for completion calls.
pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = LlmResult<String>> + Send + 'a>>;

/// Role of a turn in an outbound completion request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Instructions for the model.
    System,
    /// User input.
    User,
    /// Previous model output.
    Assistant,
}

impl From<Role> for TurnRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
        }
    }
}

/// One message of an outbound completion request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChatTurn {
    /// Author of the turn.
    pub role: TurnRole,
    /// Turn text.
    pub content: String,
}

impl ChatTurn {
    /// Build a turn.
    #[must_use]
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatTurn {
    fn from(message: &Message) -> Self {
        Self::new(message.role.into(), message.content.clone())
    }
}

/// A chat-completion provider.
pub trait CompletionClient: Send + Sync {
    /// Send `turns` and return the reply text (possibly empty).
    ///
    /// # Errors
    /// Returns an error if the provider cannot be reached or answers badly.
    fn complete<'a>(&'a self, turns: &'a [ChatTurn]) -> CompletionFuture<'a>;

    /// Model identifier used for requests.
    fn model(&self) -> &str;
}

/// Assemble the request: system prompt, prior history, then the new user message once.
#[must_use]
pub fn build_turns(system_prompt: &str, history: &[Message], user_message: &str) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(history.len() + 2);
    if !system_prompt.trim().is_empty() {
        turns.push(ChatTurn::new(TurnRole::System, system_prompt));
    }
    turns.extend(history.iter().map(ChatTurn::from));
    turns.push(ChatTurn::new(TurnRole::User, user_message));
    turns
}

/// Replace a blank reply with `fallback`.
#[must_use]
pub fn reply_or_fallback(reply: &str, fallback: &str) -> String {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
