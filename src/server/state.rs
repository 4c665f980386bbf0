//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::auth::AuthService;
use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::llm::{CompletionClient, OpenRouterClient};
use crate::speech::{GoogleTranslateTts, SpeechRenderer, SpeechSynthesizer};
use crate::storage::{self, ChatStore, UserId};

/// Shared application state.
pub struct AppState {
    /// Registration, login and token checks.
    pub auth: AuthService,
    /// Conversation operations.
    pub chat: ChatService,
    /// Text-to-speech rendering.
    pub speech: SpeechRenderer,
    /// Guest account used for unauthenticated requests, when enabled.
    pub guest: Option<UserId>,
    /// Base URL prefixed to audio links.
    pub public_url: String,
}

impl AppState {
    /// Build the state with the configured store and remote providers.
    ///
    /// # Errors
    /// Returns an error if the store, HTTP clients or audio directory cannot be set up.
    pub async fn new(
        config: &AppConfig,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let store = storage::open_store(&config.storage)
            .await
            .map_err(|e| format!("Failed to open store: {e}"))?;
        let completion = OpenRouterClient::new(&config.llm)
            .map_err(|e| format!("Failed to create completion client: {e}"))?;
        tracing::info!("Completion model: {}", completion.model());
        let synthesizer = GoogleTranslateTts::new(&config.speech)
            .map_err(|e| format!("Failed to create speech client: {e}"))?;

        Self::from_parts(config, store, Arc::new(completion), Arc::new(synthesizer)).await
    }

    /// Build the state from explicit components.
    ///
    /// # Errors
    /// Returns an error if the audio directory or guest account cannot be set up.
    pub async fn from_parts(
        config: &AppConfig,
        store: Arc<dyn ChatStore>,
        completion: Arc<dyn CompletionClient>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let auth = AuthService::new(Arc::clone(&store));
        let guest = if config.server.allow_anonymous {
            let guest = auth.ensure_guest().await?;
            tracing::info!(user_id = %guest, "Anonymous access enabled");
            Some(guest)
        } else {
            None
        };

        let chat = ChatService::new(
            store,
            completion,
            config.chat.clone(),
            config.llm.system_prompt.clone(),
        );
        let speech = SpeechRenderer::new(synthesizer, config.speech.audio_dir.clone()).await?;

        Ok(Arc::new(Self {
            auth,
            chat,
            speech,
            guest,
            public_url: config.server.public_url.clone(),
        }))
    }

    /// Public URL of a rendered audio file.
    #[must_use]
    pub fn audio_url(&self, file_name: &str) -> String {
        format!("{}/audio/{file_name}", self.public_url)
    }
}
