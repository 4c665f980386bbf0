//! Persistence for users, session tokens, conversations and messages.
//!
//! [`ChatStore`] is the repository interface; two backends implement it:
//! - `sqlite_store`: relational schema, one commit per mutation
//! - `json_store`: one JSON document rewritten after every mutation

pub mod error;
pub mod json_store;
pub mod sqlite_store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use json_store::JsonChatStore;
pub use sqlite_store::SqliteChatStore;
pub use types::{ConversationId, ConversationMeta, StoredMessage, User, UserId};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::memory::Message;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Repository for all chat state. Conversation operations are scoped to an owner:
/// a conversation belonging to someone else behaves as missing.
pub trait ChatStore: Send + Sync {
    /// Create a user.
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if the username is taken.
    fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, StoreResult<User>>;

    /// Find a user by username.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn find_user(&self, username: &str) -> StoreFuture<'_, StoreResult<Option<User>>>;

    /// Make `token` the only valid session token of `user_id`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn replace_session_token(
        &self,
        user_id: UserId,
        token: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, StoreResult<()>>;

    /// Resolve a session token to its user.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn user_for_token(&self, token: &str) -> StoreFuture<'_, StoreResult<Option<UserId>>>;

    /// Create an empty conversation with a fresh identifier.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create_conversation(
        &self,
        owner: UserId,
        title: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, StoreResult<ConversationMeta>>;

    /// List the owner's conversations, most recently updated first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_conversations(&self, owner: UserId)
    -> StoreFuture<'_, StoreResult<Vec<ConversationMeta>>>;

    /// Get one conversation.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_conversation(
        &self,
        owner: UserId,
        id: &ConversationId,
    ) -> StoreFuture<'_, StoreResult<Option<ConversationMeta>>>;

    /// Set a conversation title. Returns `false` if the conversation is missing.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn update_title(
        &self,
        owner: UserId,
        id: &ConversationId,
        title: &str,
    ) -> StoreFuture<'_, StoreResult<bool>>;

    /// Delete a conversation and its messages. Returns `false` if it was missing.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn delete_conversation(
        &self,
        owner: UserId,
        id: &ConversationId,
    ) -> StoreFuture<'_, StoreResult<bool>>;

    /// Append messages atomically and touch `updated_at`.
    ///
    /// `first_title` is applied in the same write, and only if the
    /// conversation had no messages before. Returns the conversation after
    /// the append, or `None` if it is missing.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn append_messages(
        &self,
        owner: UserId,
        id: &ConversationId,
        messages: Vec<Message>,
        first_title: Option<String>,
        now_ms: i64,
    ) -> StoreFuture<'_, StoreResult<Option<ConversationMeta>>>;

    /// Load the last `limit` messages in chronological order.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn load_recent_messages(
        &self,
        owner: UserId,
        id: &ConversationId,
        limit: usize,
    ) -> StoreFuture<'_, StoreResult<Vec<Message>>>;
}

/// Open the configured backend.
///
/// # Errors
/// Returns an error if the database or document cannot be opened.
pub async fn open_store(config: &StorageConfig) -> StoreResult<Arc<dyn ChatStore>> {
    let store: Arc<dyn ChatStore> = match config.backend {
        StorageBackend::Sqlite => {
            tracing::info!("Using SQLite store at {}", config.sqlite_path.display());
            Arc::new(SqliteChatStore::open(&config.sqlite_path).await?)
        }
        StorageBackend::Json => {
            tracing::info!("Using JSON store at {}", config.json_path.display());
            Arc::new(JsonChatStore::open(&config.json_path).await?)
        }
    };
    Ok(store)
}

/// Behaviour every backend must share, run by each backend's tests.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::memory::Role;

    pub(crate) async fn users_and_tokens(store: &dyn ChatStore) {
        let alice = store.create_user("alice", "hash-a", 1).await.unwrap();
        assert_eq!(alice.username, "alice");
        assert!(matches!(
            store.create_user("alice", "other", 2).await,
            Err(StoreError::Conflict(_))
        ));

        let found = store.find_user("alice").await.unwrap();
        assert_eq!(found, Some(alice.clone()));
        assert_eq!(store.find_user("bob").await.unwrap(), None);

        store.replace_session_token(alice.id, "t1", 10).await.unwrap();
        assert_eq!(store.user_for_token("t1").await.unwrap(), Some(alice.id));

        store.replace_session_token(alice.id, "t2", 20).await.unwrap();
        assert_eq!(store.user_for_token("t1").await.unwrap(), None);
        assert_eq!(store.user_for_token("t2").await.unwrap(), Some(alice.id));
    }

    pub(crate) async fn conversations(store: &dyn ChatStore) {
        let owner = store.create_user("owner", "h", 1).await.unwrap().id;
        let other = store.create_user("other", "h", 1).await.unwrap().id;

        let first = store.create_conversation(owner, "New conversation", 100).await.unwrap();
        let second = store.create_conversation(owner, "New conversation", 200).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.message_count, 0);

        let after = store
            .append_messages(
                owner,
                &first.id,
                vec![Message::user("hi"), Message::assistant("hello")],
                Some("Greeting".to_string()),
                300,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.message_count, 2);
        assert_eq!(after.title, "Greeting");
        // A title offered after the first exchange is ignored.
        let after = store
            .append_messages(
                owner,
                &first.id,
                vec![Message::user("again")],
                Some("Other".to_string()),
                400,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.message_count, 3);
        assert_eq!(after.title, "Greeting");
        assert_eq!(after.updated_at, 400);

        let listed = store.list_conversations(owner).await.unwrap();
        let ids: Vec<&ConversationId> = listed.iter().map(|c| &c.id).collect();
        assert_eq!(ids, vec![&first.id, &second.id]);
        assert_eq!(listed[0].message_count, 3);
        assert_eq!(listed[0].updated_at, 400);

        let recent = store
            .load_recent_messages(owner, &first.id, 2)
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].role, Role::Assistant);
        assert_eq!(recent[1].content, "again");

        assert!(store.update_title(owner, &first.id, "Greetings").await.unwrap());
        let meta = store.get_conversation(owner, &first.id).await.unwrap();
        assert_eq!(meta.map(|m| m.title), Some("Greetings".to_string()));

        // Another user's view.
        assert_eq!(store.get_conversation(other, &first.id).await.unwrap(), None);
        assert!(store.list_conversations(other).await.unwrap().is_empty());
        assert!(!store.update_title(other, &first.id, "x").await.unwrap());
        assert_eq!(
            store
                .append_messages(other, &first.id, vec![Message::user("x")], None, 500)
                .await
                .unwrap(),
            None
        );
        assert!(!store.delete_conversation(other, &first.id).await.unwrap());

        assert!(store.delete_conversation(owner, &first.id).await.unwrap());
        assert!(!store.delete_conversation(owner, &first.id).await.unwrap());
        assert_eq!(store.get_conversation(owner, &first.id).await.unwrap(), None);
        assert!(
            store
                .load_recent_messages(owner, &first.id, 10)
                .await
                .unwrap()
                .is_empty()
        );
        let listed = store.list_conversations(owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, second.id);
    }
}
