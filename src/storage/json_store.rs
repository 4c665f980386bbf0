//! JSON-file chat store.
//!
//! The whole document lives in memory behind a mutex and is rewritten to disk
//! after every mutation. There is no partial-write recovery.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::memory::Message;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::{ConversationId, ConversationMeta, StoredMessage, User, UserId};
use crate::storage::{ChatStore, StoreFuture};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct UserRecord {
    id: UserId,
    username: String,
    password_hash: String,
    created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TokenRecord {
    user_id: UserId,
    created_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ConversationRecord {
    owner: UserId,
    title: String,
    created_at: i64,
    updated_at: i64,
    #[serde(default)]
    history: Vec<StoredMessage>,
}

impl ConversationRecord {
    fn meta(&self, id: &str) -> ConversationMeta {
        ConversationMeta {
            id: ConversationId::from(id),
            owner: self.owner,
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: u32::try_from(self.history.len()).unwrap_or(u32::MAX),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    users: Vec<UserRecord>,
    #[serde(default)]
    tokens: BTreeMap<String, TokenRecord>,
    #[serde(default)]
    conversations: BTreeMap<String, ConversationRecord>,
}

impl Document {
    fn owned_mut(&mut self, owner: UserId, id: &str) -> Option<&mut ConversationRecord> {
        self.conversations
            .get_mut(id)
            .filter(|record| record.owner == owner)
    }

    fn owned(&self, owner: UserId, id: &str) -> Option<&ConversationRecord> {
        self.conversations
            .get(id)
            .filter(|record| record.owner == owner)
    }
}

/// Store persisting everything in one pretty-printed JSON file.
pub struct JsonChatStore {
    path: PathBuf,
    document: Mutex<Document>,
}

impl JsonChatStore {
    /// Load the document at `path`, starting empty when the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let document = match tokio::fs::read(path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Document::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Document::default(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            document: Mutex::new(document),
        })
    }

    /// Run `change` on a copy of the document and swap it in once written.
    ///
    /// A failed write leaves both the file and the in-memory document as they were.
    async fn mutate<T, F>(&self, change: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Document) -> StoreResult<Change<T>>,
    {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        match change(&mut next)? {
            Change::Unchanged(value) => Ok(value),
            Change::Applied(value) => {
                let bytes = serde_json::to_vec_pretty(&next)?;
                tokio::fs::write(&self.path, bytes).await?;
                *document = next;
                Ok(value)
            }
        }
    }
}

/// Outcome of a document mutation.
enum Change<T> {
    /// The document was modified and must be written.
    Applied(T),
    /// Nothing changed.
    Unchanged(T),
}

fn to_user(record: &UserRecord) -> User {
    User {
        id: record.id,
        username: record.username.clone(),
        password_hash: record.password_hash.clone(),
    }
}

impl ChatStore for JsonChatStore {
    fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, StoreResult<User>> {
        let username = username.to_string();
        let password_hash = password_hash.to_string();
        Box::pin(self.mutate(move |document| {
            if document.users.iter().any(|user| user.username == username) {
                return Err(StoreError::Conflict(format!(
                    "username {username} already exists"
                )));
            }

            let next_id = document.users.iter().map(|user| user.id.0).max().unwrap_or(0) + 1;
            let record = UserRecord {
                id: UserId(next_id),
                username,
                password_hash,
                created_at: now_ms,
            };
            let user = to_user(&record);
            document.users.push(record);
            Ok(Change::Applied(user))
        }))
    }

    fn find_user(&self, username: &str) -> StoreFuture<'_, StoreResult<Option<User>>> {
        let username = username.to_string();
        Box::pin(async move {
            let document = self.document.lock().await;
            Ok(document
                .users
                .iter()
                .find(|user| user.username == username)
                .map(to_user))
        })
    }

    fn replace_session_token(
        &self,
        user_id: UserId,
        token: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, StoreResult<()>> {
        let token = token.to_string();
        Box::pin(self.mutate(move |document| {
            document.tokens.retain(|_, record| record.user_id != user_id);
            document.tokens.insert(
                token,
                TokenRecord {
                    user_id,
                    created_at: now_ms,
                },
            );
            Ok(Change::Applied(()))
        }))
    }

    fn user_for_token(&self, token: &str) -> StoreFuture<'_, StoreResult<Option<UserId>>> {
        let token = token.to_string();
        Box::pin(async move {
            let document = self.document.lock().await;
            Ok(document.tokens.get(&token).map(|record| record.user_id))
        })
    }

    fn create_conversation(
        &self,
        owner: UserId,
        title: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, StoreResult<ConversationMeta>> {
        let title = title.to_string();
        Box::pin(self.mutate(move |document| {
            let mut id = ConversationId::generate();
            while document.conversations.contains_key(id.as_str()) {
                id = ConversationId::generate();
            }

            let record = ConversationRecord {
                owner,
                title,
                created_at: now_ms,
                updated_at: now_ms,
                history: Vec::new(),
            };
            let meta = record.meta(id.as_str());
            document.conversations.insert(id.to_string(), record);
            Ok(Change::Applied(meta))
        }))
    }

    fn list_conversations(
        &self,
        owner: UserId,
    ) -> StoreFuture<'_, StoreResult<Vec<ConversationMeta>>> {
        Box::pin(async move {
            let document = self.document.lock().await;
            let mut metas: Vec<ConversationMeta> = document
                .conversations
                .iter()
                .filter(|(_, record)| record.owner == owner)
                .map(|(id, record)| record.meta(id))
                .collect();
            metas.sort_by(|a, b| {
                b.updated_at
                    .cmp(&a.updated_at)
                    .then(b.created_at.cmp(&a.created_at))
            });
            Ok(metas)
        })
    }

    fn get_conversation(
        &self,
        owner: UserId,
        id: &ConversationId,
    ) -> StoreFuture<'_, StoreResult<Option<ConversationMeta>>> {
        let id = id.to_string();
        Box::pin(async move {
            let document = self.document.lock().await;
            Ok(document.owned(owner, &id).map(|record| record.meta(&id)))
        })
    }

    fn update_title(
        &self,
        owner: UserId,
        id: &ConversationId,
        title: &str,
    ) -> StoreFuture<'_, StoreResult<bool>> {
        let id = id.to_string();
        let title = title.to_string();
        Box::pin(self.mutate(move |document| {
            let Some(record) = document.owned_mut(owner, &id) else {
                return Ok(Change::Unchanged(false));
            };
            record.title = title;
            Ok(Change::Applied(true))
        }))
    }

    fn delete_conversation(
        &self,
        owner: UserId,
        id: &ConversationId,
    ) -> StoreFuture<'_, StoreResult<bool>> {
        let id = id.to_string();
        Box::pin(self.mutate(move |document| {
            if document.owned(owner, &id).is_none() {
                return Ok(Change::Unchanged(false));
            }
            document.conversations.remove(&id);
            Ok(Change::Applied(true))
        }))
    }

    fn append_messages(
        &self,
        owner: UserId,
        id: &ConversationId,
        messages: Vec<Message>,
        first_title: Option<String>,
        now_ms: i64,
    ) -> StoreFuture<'_, StoreResult<Option<ConversationMeta>>> {
        let id = id.to_string();
        Box::pin(self.mutate(move |document| {
            let Some(record) = document.owned_mut(owner, &id) else {
                return Ok(Change::Unchanged(None));
            };
            if let Some(title) = first_title.filter(|_| record.history.is_empty()) {
                record.title = title;
            }
            record.history.extend(
                messages
                    .into_iter()
                    .map(|message| StoredMessage::new(message, now_ms)),
            );
            record.updated_at = now_ms;
            Ok(Change::Applied(Some(record.meta(&id))))
        }))
    }

    fn load_recent_messages(
        &self,
        owner: UserId,
        id: &ConversationId,
        limit: usize,
    ) -> StoreFuture<'_, StoreResult<Vec<Message>>> {
        let id = id.to_string();
        Box::pin(async move {
            let document = self.document.lock().await;
            let Some(record) = document.owned(owner, &id) else {
                return Ok(Vec::new());
            };
            let start = record.history.len().saturating_sub(limit);
            Ok(record.history[start..]
                .iter()
                .cloned()
                .map(Message::from)
                .collect())
        })
    }
}
