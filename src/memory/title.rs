//! Conversation title derivation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Title given to a conversation before its first message.
pub const DEFAULT_TITLE: &str = "New conversation";

/// Number of words kept by [`TitleStrategy::Words`].
const TITLE_WORDS: usize = 3;
/// Number of characters kept by [`TitleStrategy::Preview`].
const PREVIEW_CHARS: usize = 20;
/// Maximum length of a model-generated title.
const MODEL_TITLE_MAX_CHARS: usize = 50;
/// Characters of each message quoted in the title prompt.
const PROMPT_EXCERPT_CHARS: usize = 200;

/// How a conversation title is derived from its first user message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleStrategy {
    /// First three words of the message.
    #[default]
    Words,
    /// First twenty characters plus a timestamp.
    Preview,
    /// Ask the completion model for a short title.
    Model,
}

impl fmt::Display for TitleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Words => "words",
            Self::Preview => "preview",
            Self::Model => "model",
        };
        write!(f, "{name}")
    }
}

impl FromStr for TitleStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "words" => Ok(Self::Words),
            "preview" => Ok(Self::Preview),
            "model" => Ok(Self::Model),
            other => Err(other.to_string()),
        }
    }
}

/// First three words of `message`, with `...` when more follow.
#[must_use]
pub fn title_from_words(message: &str) -> String {
    let words: Vec<&str> = message.split_whitespace().collect();
    if words.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    let mut title = words[..words.len().min(TITLE_WORDS)].join(" ");
    if words.len() > TITLE_WORDS {
        title.push_str("...");
    }
    title
}

/// Leading characters of `message` followed by the local `dd/mm HH:MM` time.
#[must_use]
pub fn title_from_preview<Tz>(message: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    let mut preview: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    if trimmed.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    format!("{preview} ({})", now.format("%d/%m %H:%M"))
}

/// Prompt asking the model for a title of a new conversation.
#[must_use]
pub fn title_prompt(first_user_message: &str, first_assistant_message: &str) -> String {
    format!(
        "Generate a very short title (3-6 words maximum) for this conversation.
Output ONLY the title, nothing else. No quotes, no punctuation at the end.
Do not use asterisks or any special formatting.

User: {}
Assistant: {}

Title:",
        excerpt(first_user_message),
        excerpt(first_assistant_message),
    )
}

/// Strip quotes and markup from a model title and cap its length.
///
/// Returns `None` when nothing usable remains.
#[must_use]
pub fn clean_model_title(raw: &str) -> Option<String> {
    let first_line = raw.trim().lines().next().unwrap_or_default();
    let cleaned = first_line
        .trim()
        .trim_start_matches("Title:")
        .trim()
        .trim_matches('"')
        .trim_matches('*')
        .trim();
    let title: String = cleaned.chars().take(MODEL_TITLE_MAX_CHARS).collect();
    let title = title.trim_end().to_string();
    if title.is_empty() { None } else { Some(title) }
}

fn excerpt(text: &str) -> String {
    text.chars().take(PROMPT_EXCERPT_CHARS).collect()
}
