//! Conversation orchestration: history, completion, titles and persistence.

pub mod error;
pub mod service;

pub use error::{ChatError, ChatResult};
pub use service::{ChatReply, ChatService, ConversationDetail};
