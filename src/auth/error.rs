//! Error types for authentication.

use thiserror::Error;

use crate::storage::StoreError;

/// Authentication error type.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or malformed registration/login fields.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Username already registered.
    #[error("username already registered")]
    UsernameTaken,
    /// Unknown user or wrong password.
    #[error("invalid username or password")]
    InvalidCredentials,
    /// Missing, unknown or replaced session token.
    #[error("missing or invalid session token")]
    Unauthorized,
    /// Password hashing failure.
    #[error("password hash error: {0}")]
    Hash(String),
    /// Storage failure.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => Self::UsernameTaken,
            other => Self::Store(other),
        }
    }
}

/// Convenience result alias for authentication.
pub type AuthResult<T> = Result<T, AuthError>;
