//! Error types for speech rendering.

use thiserror::Error;

/// Speech rendering error type.
#[derive(Debug, Error)]
pub enum SpeechError {
    /// Nothing speakable remains after cleaning.
    #[error("no text to speak")]
    EmptyText,
    /// HTTP client error.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    /// Speech provider answered with a non-success status.
    #[error("speech provider returned status {0}")]
    HttpStatusNotOk(u16),
    /// Audio file could not be written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Emoji pattern failed to compile.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// Convenience result alias for speech rendering.
pub type SpeechResult<T> = Result<T, SpeechError>;
