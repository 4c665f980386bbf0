//! `SQLite`-backed chat store.

use std::path::Path;
use std::str::FromStr;

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::memory::{Message, Role};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::{ConversationId, ConversationMeta, User, UserId};
use crate::storage::{ChatStore, StoreFuture};

/// Attempts at drawing an unused conversation id before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS session_tokens (
    token TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_session_tokens_user
    ON session_tokens (user_id);
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    message_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_conversations_user_updated
    ON conversations (user_id, updated_at DESC);
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL REFERENCES conversations (id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages (conversation_id, id);
";

/// Relational store: `users`, `session_tokens`, `conversations`, `messages`.
pub struct SqliteChatStore {
    conn: Connection,
}

impl SqliteChatStore {
    /// Open (or create) the database file and ensure the schema exists.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> StoreResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

fn meta_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationMeta> {
    let id: String = row.get(0)?;
    Ok(ConversationMeta {
        id: ConversationId::from(id),
        owner: UserId(row.get(1)?),
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        message_count: row.get(5)?,
    })
}

impl ChatStore for SqliteChatStore {
    fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, StoreResult<User>> {
        let username = username.to_string();
        let password_hash = password_hash.to_string();
        Box::pin(async move {
            let name = username.clone();
            let created = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let taken: i64 = tx.query_row(
                        "SELECT COUNT(*) FROM users WHERE username = ?1",
                        rusqlite::params![username],
                        |row| row.get(0),
                    )?;
                    if taken > 0 {
                        return Ok(None);
                    }
                    tx.execute(
                        "INSERT INTO users (username, password_hash, created_at)
                         VALUES (?1, ?2, ?3)",
                        rusqlite::params![username, password_hash, now_ms],
                    )?;
                    let id = tx.last_insert_rowid();
                    tx.commit()?;
                    Ok(Some(User {
                        id: UserId(id),
                        username,
                        password_hash,
                    }))
                })
                .await?;
            created.ok_or_else(|| StoreError::Conflict(format!("username {name} already exists")))
        })
    }

    fn find_user(&self, username: &str) -> StoreFuture<'_, StoreResult<Option<User>>> {
        let username = username.to_string();
        Box::pin(async move {
            let user = self
                .conn
                .call(move |conn| {
                    let user = conn
                        .query_row(
                            "SELECT id, username, password_hash FROM users WHERE username = ?1",
                            rusqlite::params![username],
                            |row| {
                                Ok(User {
                                    id: UserId(row.get(0)?),
                                    username: row.get(1)?,
                                    password_hash: row.get(2)?,
                                })
                            },
                        )
                        .optional()?;
                    Ok(user)
                })
                .await?;
            Ok(user)
        })
    }

    fn replace_session_token(
        &self,
        user_id: UserId,
        token: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, StoreResult<()>> {
        let token = token.to_string();
        Box::pin(async move {
            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    tx.execute(
                        "DELETE FROM session_tokens WHERE user_id = ?1",
                        rusqlite::params![user_id.0],
                    )?;
                    tx.execute(
                        "INSERT INTO session_tokens (token, user_id, created_at)
                         VALUES (?1, ?2, ?3)",
                        rusqlite::params![token, user_id.0, now_ms],
                    )?;
                    tx.commit()?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn user_for_token(&self, token: &str) -> StoreFuture<'_, StoreResult<Option<UserId>>> {
        let token = token.to_string();
        Box::pin(async move {
            let user_id = self
                .conn
                .call(move |conn| {
                    let id = conn
                        .query_row(
                            "SELECT user_id FROM session_tokens WHERE token = ?1",
                            rusqlite::params![token],
                            |row| row.get::<_, i64>(0),
                        )
                        .optional()?;
                    Ok(id)
                })
                .await?;
            Ok(user_id.map(UserId))
        })
    }

    fn create_conversation(
        &self,
        owner: UserId,
        title: &str,
        now_ms: i64,
    ) -> StoreFuture<'_, StoreResult<ConversationMeta>> {
        let title = title.to_string();
        Box::pin(async move {
            let meta = self
                .conn
                .call(move |conn| {
                    for _ in 0..MAX_ID_ATTEMPTS {
                        let id = ConversationId::generate();
                        let inserted = conn.execute(
                            "INSERT OR IGNORE INTO conversations
                             (id, user_id, title, created_at, updated_at, message_count)
                             VALUES (?1, ?2, ?3, ?4, ?4, 0)",
                            rusqlite::params![id.as_str(), owner.0, title, now_ms],
                        )?;
                        if inserted == 1 {
                            return Ok(ConversationMeta {
                                id,
                                owner,
                                title,
                                created_at: now_ms,
                                updated_at: now_ms,
                                message_count: 0,
                            });
                        }
                    }
                    Err(tokio_rusqlite::Error::Other(
                        "could not allocate a conversation id".into(),
                    ))
                })
                .await?;
            Ok(meta)
        })
    }

    fn list_conversations(
        &self,
        owner: UserId,
    ) -> StoreFuture<'_, StoreResult<Vec<ConversationMeta>>> {
        Box::pin(async move {
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT id, user_id, title, created_at, updated_at, message_count
                         FROM conversations
                         WHERE user_id = ?1
                         ORDER BY updated_at DESC, created_at DESC, rowid DESC",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![owner.0], meta_from_row)?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(rows)
                })
                .await?;
            Ok(rows)
        })
    }

    fn get_conversation(
        &self,
        owner: UserId,
        id: &ConversationId,
    ) -> StoreFuture<'_, StoreResult<Option<ConversationMeta>>> {
        let id = id.to_string();
        Box::pin(async move {
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            "SELECT id, user_id, title, created_at, updated_at, message_count
                             FROM conversations
                             WHERE id = ?1 AND user_id = ?2",
                            rusqlite::params![id, owner.0],
                            meta_from_row,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;
            Ok(row)
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
        Box::pin(async move {
            let changed = self
                .conn
                .call(move |conn| {
                    let changed = conn.execute(
                        "UPDATE conversations SET title = ?1 WHERE id = ?2 AND user_id = ?3",
                        rusqlite::params![title, id, owner.0],
                    )?;
                    Ok(changed)
                })
                .await?;
            Ok(changed > 0)
        })
    }

    fn delete_conversation(
        &self,
        owner: UserId,
        id: &ConversationId,
    ) -> StoreFuture<'_, StoreResult<bool>> {
        let id = id.to_string();
        Box::pin(async move {
            let deleted = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    tx.execute(
                        "DELETE FROM messages
                         WHERE conversation_id = ?1
                           AND EXISTS (SELECT 1 FROM conversations WHERE id = ?1 AND user_id = ?2)",
                        rusqlite::params![id, owner.0],
                    )?;
                    let deleted = tx.execute(
                        "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
                        rusqlite::params![id, owner.0],
                    )?;
                    tx.commit()?;
                    Ok(deleted)
                })
                .await?;
            Ok(deleted > 0)
        })
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
        Box::pin(async move {
            let added = i64::try_from(messages.len())
                .map_err(|_| StoreError::InvalidRecord("too many messages".to_string()))?;
            let meta = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let prior: Option<u32> = tx
                        .query_row(
                            "SELECT message_count FROM conversations
                             WHERE id = ?1 AND user_id = ?2",
                            rusqlite::params![id, owner.0],
                            |row| row.get(0),
                        )
                        .optional()?;
                    let Some(prior) = prior else {
                        return Ok(None);
                    };

                    {
                        let mut stmt = tx.prepare(
                            "INSERT INTO messages (conversation_id, role, content, created_at)
                             VALUES (?1, ?2, ?3, ?4)",
                        )?;
                        for message in messages {
                            stmt.execute(rusqlite::params![
                                id,
                                message.role.as_str(),
                                message.content,
                                now_ms
                            ])?;
                        }
                    }

                    tx.execute(
                        "UPDATE conversations
                         SET message_count = message_count + ?1, updated_at = ?2
                         WHERE id = ?3",
                        rusqlite::params![added, now_ms, id],
                    )?;
                    if let Some(title) = first_title.filter(|_| prior == 0) {
                        tx.execute(
                            "UPDATE conversations SET title = ?1 WHERE id = ?2",
                            rusqlite::params![title, id],
                        )?;
                    }
                    let meta = tx.query_row(
                        "SELECT id, user_id, title, created_at, updated_at, message_count
                         FROM conversations
                         WHERE id = ?1",
                        rusqlite::params![id],
                        meta_from_row,
                    )?;
                    tx.commit()?;
                    Ok(Some(meta))
                })
                .await?;
            Ok(meta)
        })
    }

    fn load_recent_messages(
        &self,
        owner: UserId,
        id: &ConversationId,
        limit: usize,
    ) -> StoreFuture<'_, StoreResult<Vec<Message>>> {
        let id = id.to_string();
        Box::pin(async move {
            let limit = i64::try_from(limit)
                .map_err(|_| StoreError::InvalidRecord("limit exceeds i64".to_string()))?;
            let mut rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT m.role, m.content
                         FROM messages m
                         JOIN conversations c ON c.id = m.conversation_id
                         WHERE m.conversation_id = ?1 AND c.user_id = ?2
                         ORDER BY m.id DESC
                         LIMIT ?3",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![id, owner.0, limit], |row| {
                            let role: String = row.get(0)?;
                            let content: String = row.get(1)?;
                            Ok((role, content))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            rows.reverse();
            rows.into_iter()
                .map(|(role, content)| {
                    let role = Role::from_str(&role)
                        .map_err(|err| StoreError::InvalidRecord(format!("invalid role: {err}")))?;
                    Ok(Message { role, content })
                })
                .collect()
        })
    }
}
