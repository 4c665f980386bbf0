//! Records persisted by the chat stores.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::{Message, Role};

/// Length of generated conversation identifiers.
const CONVERSATION_ID_LEN: usize = 8;

/// Identifier of a registered user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque short identifier of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Generate a fresh identifier (leading hex characters of a random UUID).
    #[must_use]
    pub fn generate() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(CONVERSATION_ID_LEN);
        Self(id)
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A registered account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Argon2 PHC string.
    pub password_hash: String,
}

/// Conversation metadata without its messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMeta {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Owning user.
    pub owner: UserId,
    /// Display title.
    pub title: String,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub created_at: i64,
    /// Last activity timestamp in milliseconds since Unix epoch.
    pub updated_at: i64,
    /// Number of stored messages.
    pub message_count: u32,
}

/// A message as persisted, with its creation time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Author.
    pub role: Role,
    /// Text.
    pub content: String,
    /// Creation timestamp in milliseconds since Unix epoch.
    #[serde(default)]
    pub created_at: i64,
}

impl StoredMessage {
    /// Attach a timestamp to a message.
    #[must_use]
    pub fn new(message: Message, created_at: i64) -> Self {
        Self {
            role: message.role,
            content: message.content,
            created_at,
        }
    }
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        Self {
            role: stored.role,
            content: stored.content,
        }
    }
}
