//! Chat service tying the store, the completion client and title derivation together.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chat::error::{ChatError, ChatResult};
use crate::config::ChatConfig;
use crate::llm::{ChatTurn, CompletionClient, TurnRole, build_turns, reply_or_fallback};
use crate::memory::title::{clean_model_title, title_from_preview, title_from_words, title_prompt};
use crate::memory::{BoundedHistory, DEFAULT_TITLE, Message, TitleStrategy};
use crate::storage::{ChatStore, ConversationId, ConversationMeta, UserId};

/// Result of one chat exchange.
#[derive(Clone, Debug, Serialize)]
pub struct ChatReply {
    /// Conversation the exchange was stored in.
    pub conversation_id: ConversationId,
    /// Current conversation title.
    pub title: String,
    /// Assistant reply.
    pub response: String,
    /// Bounded history after the exchange.
    pub history: Vec<Message>,
}

/// A conversation with its bounded history.
#[derive(Clone, Debug, Serialize)]
pub struct ConversationDetail {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
    /// Most recent messages, oldest first.
    pub history: Vec<Message>,
}

/// Per-owner conversation operations.
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    completion: Arc<dyn CompletionClient>,
    config: ChatConfig,
    system_prompt: String,
    active: DashMap<UserId, ConversationId>,
}

impl ChatService {
    /// Create the service.
    #[must_use]
    pub fn new(
        store: Arc<dyn ChatStore>,
        completion: Arc<dyn CompletionClient>,
        config: ChatConfig,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            store,
            completion,
            config,
            system_prompt: system_prompt.into(),
            active: DashMap::new(),
        }
    }

    /// Send a user message and store the exchange.
    ///
    /// Without `conversation_id` the owner's active conversation is used, or a
    /// new one is started.
    ///
    /// # Errors
    /// Returns [`ChatError::InvalidInput`] for blank messages,
    /// [`ChatError::ConversationNotFound`] for unknown ids, and provider or
    /// storage errors.
    pub async fn send(
        &self,
        owner: UserId,
        message: &str,
        conversation_id: Option<&str>,
    ) -> ChatResult<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::InvalidInput("message must not be empty".to_string()));
        }

        let meta = self.resolve(owner, conversation_id).await?;
        let prior = self
            .store
            .load_recent_messages(owner, &meta.id, self.config.history_len)
            .await?;
        let mut history = BoundedHistory::from_messages(self.config.history_len, prior);

        let turns = build_turns(&self.system_prompt, &history.messages(), message);
        debug!(conversation = %meta.id, turns = turns.len(), "Requesting completion");
        let raw = self.completion.complete(&turns).await?;
        let response = reply_or_fallback(&raw, &self.config.fallback_reply);

        // Titles are derived once, for conversations nobody has named yet.
        let first_title = if meta.message_count == 0 && meta.title == DEFAULT_TITLE {
            Some(self.derive_title(message, &response).await)
        } else {
            None
        };

        let exchange = vec![Message::user(message), Message::assistant(response.clone())];
        let updated = self
            .store
            .append_messages(owner, &meta.id, exchange.clone(), first_title, now_ms())
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(meta.id.to_string()))?;
        for item in exchange {
            history.push_message(item);
        }
        if updated.title != meta.title {
            info!(conversation = %updated.id, "Titled conversation \"{}\"", updated.title);
        }

        self.active.insert(owner, updated.id.clone());
        Ok(ChatReply {
            conversation_id: updated.id,
            title: updated.title,
            response,
            history: history.messages(),
        })
    }

    /// The owner's conversations, most recently updated first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn list(&self, owner: UserId) -> ChatResult<Vec<ConversationMeta>> {
        Ok(self.store.list_conversations(owner).await?)
    }

    /// One conversation with its bounded history.
    ///
    /// # Errors
    /// Returns [`ChatError::ConversationNotFound`] if the owner has no such conversation.
    pub async fn get(&self, owner: UserId, id: &str) -> ChatResult<ConversationDetail> {
        let meta = self.find(owner, id).await?;
        let history = self
            .store
            .load_recent_messages(owner, &meta.id, self.config.history_len)
            .await?;
        Ok(ConversationDetail {
            id: meta.id,
            title: meta.title,
            history,
        })
    }

    /// Start an empty conversation and make it active.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn create(&self, owner: UserId) -> ChatResult<ConversationMeta> {
        let meta = self
            .store
            .create_conversation(owner, DEFAULT_TITLE, now_ms())
            .await?;
        self.active.insert(owner, meta.id.clone());
        info!(user_id = %owner, conversation = %meta.id, "Created conversation");
        Ok(meta)
    }

    /// Rename a conversation.
    ///
    /// # Errors
    /// Returns [`ChatError::InvalidInput`] for a blank title and
    /// [`ChatError::ConversationNotFound`] for unknown ids.
    pub async fn rename(
        &self,
        owner: UserId,
        id: &str,
        title: &str,
    ) -> ChatResult<ConversationMeta> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::InvalidInput("title must not be empty".to_string()));
        }
        let id = ConversationId::from(id);
        if !self.store.update_title(owner, &id, title).await? {
            return Err(ChatError::ConversationNotFound(id.to_string()));
        }
        self.find(owner, id.as_str()).await
    }

    /// Make a conversation the owner's active one.
    ///
    /// # Errors
    /// Returns [`ChatError::ConversationNotFound`] for unknown ids.
    pub async fn select(&self, owner: UserId, id: &str) -> ChatResult<ConversationMeta> {
        let meta = self.find(owner, id).await?;
        self.active.insert(owner, meta.id.clone());
        Ok(meta)
    }

    /// Delete a conversation. Deleting a missing one is not an error.
    ///
    /// When the active conversation goes away the most recently updated
    /// remaining one becomes active.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn delete(&self, owner: UserId, id: &str) -> ChatResult<bool> {
        let id = ConversationId::from(id);
        let removed = self.store.delete_conversation(owner, &id).await?;

        let was_active = self
            .active
            .get(&owner)
            .is_some_and(|active| *active.value() == id);
        if was_active {
            match self.store.list_conversations(owner).await?.into_iter().next() {
                Some(next) => {
                    self.active.insert(owner, next.id);
                }
                None => {
                    self.active.remove(&owner);
                }
            }
        }

        if removed {
            info!(user_id = %owner, conversation = %id, "Deleted conversation");
        }
        Ok(removed)
    }

    /// Last assistant message of a conversation, if any.
    ///
    /// # Errors
    /// Returns [`ChatError::ConversationNotFound`] for unknown ids.
    pub async fn last_reply(&self, owner: UserId, id: &str) -> ChatResult<Option<String>> {
        let detail = self.get(owner, id).await?;
        let history = BoundedHistory::from_messages(self.config.history_len, detail.history);
        Ok(history.last_assistant().map(|message| message.content.clone()))
    }

    /// The owner's active conversation.
    #[must_use]
    pub fn active(&self, owner: UserId) -> Option<ConversationId> {
        self.active.get(&owner).map(|entry| entry.value().clone())
    }

    async fn find(&self, owner: UserId, id: &str) -> ChatResult<ConversationMeta> {
        let id = ConversationId::from(id.trim());
        self.store
            .get_conversation(owner, &id)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(id.to_string()))
    }

    async fn resolve(
        &self,
        owner: UserId,
        requested: Option<&str>,
    ) -> ChatResult<ConversationMeta> {
        if let Some(id) = requested.map(str::trim).filter(|id| !id.is_empty()) {
            return self.find(owner, id).await;
        }

        if let Some(id) = self.active(owner) {
            if let Some(meta) = self.store.get_conversation(owner, &id).await? {
                return Ok(meta);
            }
            self.active.remove(&owner);
        }
        self.create(owner).await
    }

    async fn derive_title(&self, message: &str, response: &str) -> String {
        match self.config.title_strategy {
            TitleStrategy::Words => title_from_words(message),
            TitleStrategy::Preview => title_from_preview(message, &chrono::Local::now()),
            TitleStrategy::Model => {
                let turns = [ChatTurn::new(TurnRole::User, title_prompt(message, response))];
                match self.completion.complete(&turns).await {
                    Ok(raw) => {
                        clean_model_title(&raw).unwrap_or_else(|| title_from_words(message))
                    }
                    Err(err) => {
                        warn!("Title generation failed: {err}");
                        title_from_words(message)
                    }
                }
            }
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::llm::{CompletionFuture, LlmError};
    use crate::memory::Role;
    use crate::storage::SqliteChatStore;

    /// Replies from a script; an empty script answers "ok".
    #[derive(Default)]
    struct ScriptedCompletion {
        replies: Mutex<VecDeque<Option<String>>>,
        requests: Mutex<Vec<Vec<ChatTurn>>>,
    }

    impl ScriptedCompletion {
        fn with_replies(replies: &[Option<&str>]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.map(str::to_string)).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<Vec<ChatTurn>> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl CompletionClient for ScriptedCompletion {
        fn complete<'a>(&'a self, turns: &'a [ChatTurn]) -> CompletionFuture<'a> {
            self.requests.lock().unwrap().push(turns.to_vec());
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Some("ok".to_string()));
            Box::pin(async move {
                next.ok_or_else(|| LlmError::MalformedResponse("scripted failure".to_string()))
            })
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    struct Fixture {
        service: ChatService,
        completion: Arc<ScriptedCompletion>,
        alice: UserId,
        bob: UserId,
    }

    async fn fixture(completion: ScriptedCompletion, config: ChatConfig) -> Fixture {
        let store = Arc::new(SqliteChatStore::open_in_memory().await.unwrap());
        let alice = store.create_user("alice", "h", 1).await.unwrap().id;
        let bob = store.create_user("bob", "h", 1).await.unwrap().id;
        let completion = Arc::new(completion);
        let service = ChatService::new(store, completion.clone(), config, "be brief");
        Fixture {
            service,
            completion,
            alice,
            bob,
        }
    }

    #[tokio::test]
    async fn test_first_message_creates_and_titles_conversation() {
        let fx = fixture(ScriptedCompletion::default(), ChatConfig::default()).await;

        let reply = fx
            .service
            .send(fx.alice, "hola que tal estas hoy", None)
            .await
            .unwrap();
        assert_eq!(reply.title, "hola que tal...");
        assert_eq!(reply.response, "ok");
        assert_eq!(reply.history.len(), 2);
        assert_eq!(fx.service.active(fx.alice), Some(reply.conversation_id.clone()));

        let second = fx.service.send(fx.alice, "otra cosa", None).await.unwrap();
        assert_eq!(second.conversation_id, reply.conversation_id);
        assert_eq!(second.title, "hola que tal...");
        assert_eq!(second.history.len(), 4);
    }

    #[tokio::test]
    async fn test_request_carries_history_and_message_once() {
        let fx = fixture(ScriptedCompletion::default(), ChatConfig::default()).await;
        fx.service.send(fx.alice, "first", None).await.unwrap();
        fx.service.send(fx.alice, "second", None).await.unwrap();

        let requests = fx.completion.requests();
        let last = &requests[1];
        let contents: Vec<&str> = last.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["be brief", "first", "ok", "second"]);
        assert_eq!(last[0].role, TurnRole::System);
    }

    #[tokio::test]
    async fn test_blank_reply_uses_fallback() {
        let completion = ScriptedCompletion::with_replies(&[Some("   ")]);
        let config = ChatConfig {
            fallback_reply: "no idea".to_string(),
            ..ChatConfig::default()
        };
        let fx = fixture(completion, config).await;

        let reply = fx.service.send(fx.alice, "hi", None).await.unwrap();
        assert_eq!(reply.response, "no idea");
        let detail = fx
            .service
            .get(fx.alice, reply.conversation_id.as_str())
            .await
            .unwrap();
        assert_eq!(detail.history[1], Message::assistant("no idea"));
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected() {
        let fx = fixture(ScriptedCompletion::default(), ChatConfig::default()).await;
        assert!(matches!(
            fx.service.send(fx.alice, "  \n", None).await,
            Err(ChatError::InvalidInput(_))
        ));
        assert!(fx.completion.requests().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_stores_nothing() {
        let completion = ScriptedCompletion::with_replies(&[None]);
        let fx = fixture(completion, ChatConfig::default()).await;
        let meta = fx.service.create(fx.alice).await.unwrap();

        assert!(matches!(
            fx.service.send(fx.alice, "hi", Some(meta.id.as_str())).await,
            Err(ChatError::Completion(_))
        ));
        let detail = fx.service.get(fx.alice, meta.id.as_str()).await.unwrap();
        assert!(detail.history.is_empty());
        assert_eq!(detail.title, DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let config = ChatConfig {
            history_len: 4,
            ..ChatConfig::default()
        };
        let fx = fixture(ScriptedCompletion::default(), config).await;
        for i in 0..5 {
            let reply = fx.service.send(fx.alice, &format!("m{i}"), None).await.unwrap();
            assert!(reply.history.len() <= 4);
        }

        let requests = fx.completion.requests();
        // system + 4 prior + new message
        assert_eq!(requests[4].len(), 6);
        let reply = fx.service.send(fx.alice, "last", None).await.unwrap();
        assert_eq!(reply.history[0], Message::user("m4"));
        assert_eq!(reply.history[3], Message::assistant("ok"));
    }

    #[tokio::test]
    async fn test_model_title_strategy() {
        let completion = ScriptedCompletion::with_replies(&[
            Some("Paris is the capital."),
            Some("\"**French capital**\"\nextra"),
        ]);
        let config = ChatConfig {
            title_strategy: TitleStrategy::Model,
            ..ChatConfig::default()
        };
        let fx = fixture(completion, config).await;

        let reply = fx
            .service
            .send(fx.alice, "What is the capital of France?", None)
            .await
            .unwrap();
        assert_eq!(reply.title, "French capital");
        let requests = fx.completion.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1][0].content.contains("What is the capital of France?"));
    }

    #[tokio::test]
    async fn test_model_title_falls_back_to_words() {
        let completion = ScriptedCompletion::with_replies(&[Some("answer"), None]);
        let config = ChatConfig {
            title_strategy: TitleStrategy::Model,
            ..ChatConfig::default()
        };
        let fx = fixture(completion, config).await;

        let reply = fx.service.send(fx.alice, "uno dos tres cuatro", None).await.unwrap();
        assert_eq!(reply.title, "uno dos tres...");
        assert_eq!(reply.response, "answer");
    }

    #[tokio::test]
    async fn test_manual_title_survives_first_message() {
        let fx = fixture(ScriptedCompletion::default(), ChatConfig::default()).await;
        let meta = fx.service.create(fx.alice).await.unwrap();
        fx.service
            .rename(fx.alice, meta.id.as_str(), "Recetas")
            .await
            .unwrap();

        let reply = fx
            .service
            .send(fx.alice, "como hago pan casero", None)
            .await
            .unwrap();
        assert_eq!(reply.conversation_id, meta.id);
        assert_eq!(reply.title, "Recetas");
        let detail = fx.service.get(fx.alice, meta.id.as_str()).await.unwrap();
        assert_eq!(detail.title, "Recetas");
    }

    #[tokio::test]
    async fn test_title_is_stored_with_first_exchange() {
        let fx = fixture(ScriptedCompletion::default(), ChatConfig::default()).await;
        let reply = fx.service.send(fx.alice, "uno dos tres cuatro", None).await.unwrap();

        let listed = fx.service.list(fx.alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "uno dos tres...");
        assert_eq!(listed[0].message_count, 2);
        assert_eq!(listed[0].id, reply.conversation_id);
    }

    #[tokio::test]
    async fn test_conversations_are_owner_scoped() {
        let fx = fixture(ScriptedCompletion::default(), ChatConfig::default()).await;
        let reply = fx.service.send(fx.alice, "private", None).await.unwrap();
        let id = reply.conversation_id.as_str();

        assert!(matches!(
            fx.service.get(fx.bob, id).await,
            Err(ChatError::ConversationNotFound(_))
        ));
        assert!(matches!(
            fx.service.send(fx.bob, "hi", Some(id)).await,
            Err(ChatError::ConversationNotFound(_))
        ));
        assert!(!fx.service.delete(fx.bob, id).await.unwrap());
        assert!(fx.service.get(fx.alice, id).await.is_ok());
        assert!(fx.service.list(fx.bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_reassigns_active() {
        let fx = fixture(ScriptedCompletion::default(), ChatConfig::default()).await;
        let first = fx.service.create(fx.alice).await.unwrap();
        let second = fx.service.create(fx.alice).await.unwrap();
        assert_eq!(fx.service.active(fx.alice), Some(second.id.clone()));

        assert!(fx.service.delete(fx.alice, second.id.as_str()).await.unwrap());
        assert_eq!(fx.service.active(fx.alice), Some(first.id.clone()));
        assert!(matches!(
            fx.service.get(fx.alice, second.id.as_str()).await,
            Err(ChatError::ConversationNotFound(_))
        ));
        assert!(!fx.service.delete(fx.alice, second.id.as_str()).await.unwrap());

        fx.service.delete(fx.alice, first.id.as_str()).await.unwrap();
        assert_eq!(fx.service.active(fx.alice), None);
        assert!(fx.service.list(fx.alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_select_and_last_reply() {
        let completion = ScriptedCompletion::with_replies(&[Some("first answer")]);
        let fx = fixture(completion, ChatConfig::default()).await;
        let reply = fx.service.send(fx.alice, "question", None).await.unwrap();
        let id = reply.conversation_id.as_str();
        let other = fx.service.create(fx.alice).await.unwrap();

        let renamed = fx.service.rename(fx.alice, id, "  Trip plans ").await.unwrap();
        assert_eq!(renamed.title, "Trip plans");
        assert!(matches!(
            fx.service.rename(fx.alice, id, " ").await,
            Err(ChatError::InvalidInput(_))
        ));

        assert_eq!(fx.service.active(fx.alice), Some(other.id.clone()));
        fx.service.select(fx.alice, id).await.unwrap();
        let active = fx.service.active(fx.alice);
        assert_eq!(active.as_ref().map(ConversationId::as_str), Some(id));

        assert_eq!(
            fx.service.last_reply(fx.alice, id).await.unwrap().as_deref(),
            Some("first answer")
        );
        assert_eq!(fx.service.last_reply(fx.alice, other.id.as_str()).await.unwrap(), None);

        let detail = fx.service.get(fx.alice, id).await.unwrap();
        assert_eq!(detail.history[0].role, Role::User);
    }
}
