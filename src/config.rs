//! Environment-driven configuration for the chat server.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::memory::{DEFAULT_HISTORY_LEN, TitleStrategy};

/// Environment variable holding the completion API key.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful and concise assistant.";
const DEFAULT_FALLBACK_REPLY: &str = "Sorry, I don't have an answer for that.";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is missing or blank.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    /// A variable could not be parsed.
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// Values parsed but violate an invariant.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Convenience result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Completion provider settings.
    pub llm: LlmConfig,
    /// Chat behaviour settings.
    pub chat: ChatConfig,
    /// Persistence settings.
    pub storage: StorageConfig,
    /// Speech rendering settings.
    pub speech: SpeechConfig,
}

impl AppConfig {
    /// Build a configuration with defaults and the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::new(api_key),
            chat: ChatConfig::default(),
            storage: StorageConfig::default(),
            speech: SpeechConfig::default(),
        }
    }

    /// Load configuration from the process environment, reading `.env` first when present.
    ///
    /// # Errors
    /// Returns an error if the API key is missing or a value is invalid.
    pub fn from_env() -> ConfigResult<Self> {
        // A missing .env file is normal in containers.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns an error if the API key is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = get(API_KEY_ENV).ok_or(ConfigError::Missing(API_KEY_ENV))?;
        let mut config = Self::new(api_key);

        if let Some(model) = get("OPENROUTER_CHAT_MODEL").or_else(|| get("OPENROUTER_MODEL")) {
            config.llm.model = model;
        }
        if let Some(base_url) = get("OPENROUTER_BASE_URL") {
            config.llm.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(prompt) = get("CHARLA_SYSTEM_PROMPT") {
            config.llm.system_prompt = prompt;
        }
        if let Some(value) = get("CHARLA_TEMPERATURE") {
            config.llm.temperature = parse("CHARLA_TEMPERATURE", &value)?;
        }
        if let Some(value) = get("CHARLA_MAX_TOKENS") {
            config.llm.max_tokens = Some(parse("CHARLA_MAX_TOKENS", &value)?);
        }

        if let Some(value) = get("CHARLA_PORT") {
            config.server.port = parse("CHARLA_PORT", &value)?;
        }
        config.server.public_url = get("CHARLA_PUBLIC_URL")
            .map_or_else(
                || format!("http://localhost:{}", config.server.port),
                |url| url.trim_end_matches('/').to_string(),
            );
        if let Some(value) = get("CHARLA_ALLOW_ANONYMOUS") {
            config.server.allow_anonymous = parse_flag("CHARLA_ALLOW_ANONYMOUS", &value)?;
        }

        if let Some(value) = get("CHARLA_HISTORY_LEN") {
            config.chat.history_len = parse("CHARLA_HISTORY_LEN", &value)?;
        }
        if let Some(reply) = get("CHARLA_FALLBACK_REPLY") {
            config.chat.fallback_reply = reply;
        }
        if let Some(value) = get("CHARLA_TITLE_STRATEGY") {
            config.chat.title_strategy = parse("CHARLA_TITLE_STRATEGY", &value)?;
        }

        if let Some(value) = get("CHARLA_STORAGE") {
            config.storage.backend = parse("CHARLA_STORAGE", &value)?;
        }
        if let Some(path) = get("CHARLA_DB_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(path) = get("CHARLA_JSON_PATH") {
            config.storage.json_path = PathBuf::from(path);
        }

        if let Some(lang) = get("CHARLA_TTS_LANG") {
            config.speech.lang = lang;
        }
        if let Some(tld) = get("CHARLA_TTS_TLD") {
            config.speech.tld = tld;
        }
        config.speech.endpoint = get("CHARLA_TTS_URL");
        if let Some(dir) = get("CHARLA_AUDIO_DIR") {
            config.speech.audio_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::Missing(API_KEY_ENV));
        }

        if self.chat.history_len == 0 {
            return Err(ConfigError::Invalid(
                "chat.history_len must be > 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(
                "llm.temperature must be within 0..=2".to_string(),
            ));
        }

        if self.chat.fallback_reply.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "chat.fallback_reply must not be blank".to_string(),
            ));
        }

        Url::parse(&self.llm.base_url)?;
        Url::parse(&self.server.public_url)?;
        Url::parse(&self.speech.endpoint())?;

        Ok(())
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port.
    pub port: u16,
    /// Public base URL used to build audio links.
    pub public_url: String,
    /// Serve requests without a token as a shared guest user.
    pub allow_anonymous: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            public_url: format!("http://localhost:{DEFAULT_PORT}"),
            allow_anonymous: false,
        }
    }
}

/// Completion provider settings.
#[derive(Clone)]
pub struct LlmConfig {
    /// Provider API key.
    pub api_key: String,
    /// Chat model name.
    pub model: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// System prompt prepended to every request.
    pub system_prompt: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Optional token budget for replies.
    pub max_tokens: Option<u32>,
}

impl LlmConfig {
    /// Defaults with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("system_prompt", &self.system_prompt)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Chat behaviour settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Messages kept in the bounded history.
    pub history_len: usize,
    /// Reply stored when the provider answers with blank text.
    pub fallback_reply: String,
    /// How new conversations get their title.
    pub title_strategy: TitleStrategy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_len: DEFAULT_HISTORY_LEN,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
            title_strategy: TitleStrategy::default(),
        }
    }
}

/// Persistence backend selector.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Relational store in a `SQLite` file.
    #[default]
    Sqlite,
    /// Single JSON document rewritten on every change.
    Json,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            other => Err(other.to_string()),
        }
    }
}

/// Persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Selected backend.
    pub backend: StorageBackend,
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// JSON document path.
    pub json_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            sqlite_path: PathBuf::from("chatbot.db"),
            json_path: PathBuf::from("conversations.json"),
        }
    }
}

/// Speech rendering settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Spoken language code.
    pub lang: String,
    /// Top-level domain of the speech host.
    pub tld: String,
    /// Explicit endpoint overriding the TLD-derived one.
    pub endpoint: Option<String>,
    /// Directory where rendered audio is written and served from.
    pub audio_dir: PathBuf,
}

impl SpeechConfig {
    /// Endpoint used for synthesis requests.
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!("https://translate.google.{}/translate_tts", self.tld)
        })
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            lang: "es".to_string(),
            tld: "com".to_string(),
            endpoint: None,
            audio_dir: std::env::temp_dir().join("chatbot_audio"),
        }
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> ConfigResult<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn parse_flag(name: &'static str, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}
