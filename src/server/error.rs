//! Mapping of domain errors to HTTP responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::auth::AuthError;
use crate::chat::ChatError;
use crate::speech::SpeechError;

/// Error returned by handlers, rendered as `{error, detail}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            error,
            detail: detail.into(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", detail)
    }

    fn upstream(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "upstream_error", detail)
    }

    fn internal(err: &dyn std::error::Error) -> Self {
        tracing::error!("Internal error: {err}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal server error")
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.error,
            "detail": self.detail,
        }));
        (self.status, body).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidInput(detail) => Self::bad_request(detail),
            ChatError::ConversationNotFound(id) => Self::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("conversation {id} not found"),
            ),
            ChatError::Completion(err) => {
                tracing::warn!("Completion provider failed: {err}");
                Self::upstream(err.to_string())
            }
            ChatError::Store(err) => Self::internal(&err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidInput(detail) => Self::bad_request(detail),
            AuthError::UsernameTaken => {
                Self::new(StatusCode::CONFLICT, "conflict", err.to_string())
            }
            AuthError::InvalidCredentials | AuthError::Unauthorized => {
                Self::new(StatusCode::UNAUTHORIZED, "unauthorized", err.to_string())
            }
            AuthError::Hash(_) | AuthError::Store(_) => Self::internal(&err),
        }
    }
}

impl From<SpeechError> for ApiError {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::EmptyText => Self::bad_request(err.to_string()),
            SpeechError::HttpClient(_) | SpeechError::HttpStatusNotOk(_) => {
                tracing::warn!("Speech provider failed: {err}");
                Self::upstream(err.to_string())
            }
            SpeechError::Io(_) | SpeechError::Regex(_) => Self::internal(&err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::storage::StoreError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(ChatError::InvalidInput("x".into())), StatusCode::BAD_REQUEST),
            (
                ApiError::from(ChatError::ConversationNotFound("abc".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(ChatError::Completion(LlmError::HttpStatusNotOk {
                    status: 500,
                    body: String::new(),
                })),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(ChatError::Store(StoreError::InvalidRecord("bad".into()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::from(AuthError::UsernameTaken), StatusCode::CONFLICT),
            (ApiError::from(AuthError::Unauthorized), StatusCode::UNAUTHORIZED),
            (ApiError::from(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED),
            (ApiError::from(SpeechError::EmptyText), StatusCode::BAD_REQUEST),
            (ApiError::from(SpeechError::HttpStatusNotOk(503)), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn test_internal_detail_is_generic() {
        let err = ApiError::from(AuthError::Hash("salt exploded".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.detail.contains("salt"));
    }
}
