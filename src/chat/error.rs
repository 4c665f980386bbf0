//! Error types for the chat service.

use thiserror::Error;

use crate::llm::LlmError;
use crate::storage::StoreError;

/// Chat service error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Rejected request field.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Conversation missing or owned by someone else.
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
    /// Completion provider failure.
    #[error("completion failed: {0}")]
    Completion(#[from] LlmError),
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience result alias for the chat service.
pub type ChatResult<T> = Result<T, ChatError>;
