//! Error types for the completion adapter.

use thiserror::Error;

/// Errors produced while talking to the completion provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP client error.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    /// Provider answered with a non-success status.
    #[error("completion provider returned status {status}: {body}")]
    HttpStatusNotOk {
        /// HTTP status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },
    /// Response did not contain a usable choice.
    #[error("completion response malformed: {0}")]
    MalformedResponse(String),
}

/// Convenience result alias for completion calls.
pub type LlmResult<T> = Result<T, LlmError>;
