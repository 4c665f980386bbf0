//! Account registration, login and session-token authentication.
//!
//! Each user has at most one valid token: logging in replaces the previous one.

pub mod error;
pub mod password;

pub use error::{AuthError, AuthResult};
pub use password::{hash_password, verify_password};

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::storage::{ChatStore, User, UserId};

/// Account used for unauthenticated requests when anonymous access is enabled.
pub const GUEST_USERNAME: &str = "guest";

/// Extract the token from an `Authorization` header value.
///
/// Accepts both a bare token and the `Bearer <token>` form.
#[must_use]
pub fn token_from_header(value: &str) -> Option<&str> {
    let value = value.trim();
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if value.eq_ignore_ascii_case("bearer") => "",
        _ => value,
    };
    if token.is_empty() { None } else { Some(token) }
}

/// Authentication operations over a [`ChatStore`].
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn ChatStore>,
}

impl AuthService {
    /// Create the service.
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Register a new account.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidInput`] for blank fields and
    /// [`AuthError::UsernameTaken`] for duplicates and the reserved guest name.
    pub async fn register(&self, username: &str, password: &str) -> AuthResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::InvalidInput("username must not be empty".to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".to_string()));
        }
        if username.eq_ignore_ascii_case(GUEST_USERNAME) {
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = hash_blocking(password.to_string()).await?;
        let user = self
            .store
            .create_user(username, &password_hash, now_ms())
            .await?;
        info!(user_id = %user.id, "Registered user {}", user.username);
        Ok(user)
    }

    /// Verify credentials and issue a fresh session token.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidCredentials`] on unknown user or wrong password.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<String> {
        let user = self
            .store
            .find_user(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_blocking(password.to_string(), user.password_hash.clone()).await? {
            debug!(user_id = %user.id, "Rejected login");
            return Err(AuthError::InvalidCredentials);
        }

        let token = Uuid::new_v4().simple().to_string();
        self.store
            .replace_session_token(user.id, &token, now_ms())
            .await?;
        info!(user_id = %user.id, "User logged in");
        Ok(token)
    }

    /// Resolve an `Authorization` header value to its user.
    ///
    /// # Errors
    /// Returns [`AuthError::Unauthorized`] if the token is missing or unknown.
    pub async fn authenticate(&self, header_value: &str) -> AuthResult<UserId> {
        let token = token_from_header(header_value).ok_or(AuthError::Unauthorized)?;
        self.store
            .user_for_token(token)
            .await?
            .ok_or(AuthError::Unauthorized)
    }

    /// Find or create the shared guest account.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn ensure_guest(&self) -> AuthResult<UserId> {
        if let Some(user) = self.store.find_user(GUEST_USERNAME).await? {
            return Ok(user.id);
        }
        // Random password: the guest account cannot be logged into.
        let password_hash = hash_blocking(Uuid::new_v4().to_string()).await?;
        let user = self
            .store
            .create_user(GUEST_USERNAME, &password_hash, now_ms())
            .await?;
        info!(user_id = %user.id, "Created guest account");
        Ok(user.id)
    }
}

async fn hash_blocking(password: String) -> AuthResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|err| AuthError::Hash(err.to_string()))?
}

async fn verify_blocking(password: String, hash: String) -> AuthResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|err| AuthError::Hash(err.to_string()))?
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteChatStore;

    async fn service() -> AuthService {
        let store = SqliteChatStore::open_in_memory().await.unwrap();
        AuthService::new(Arc::new(store))
    }

    #[test]
    fn test_token_from_header() {
        assert_eq!(token_from_header("abc"), Some("abc"));
        assert_eq!(token_from_header("Bearer abc"), Some("abc"));
        assert_eq!(token_from_header("  Bearer  abc "), Some("abc"));
        assert_eq!(token_from_header("Bearer "), None);
        assert_eq!(token_from_header(""), None);
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let auth = service().await;
        let user = auth.register("  maria ", "secreto").await.unwrap();
        assert_eq!(user.username, "maria");
        assert_ne!(user.password_hash, "secreto");

        let token = auth.login("maria", "secreto").await.unwrap();
        assert_eq!(auth.authenticate(&token).await.unwrap(), user.id);
        assert_eq!(
            auth.authenticate(&format!("Bearer {token}")).await.unwrap(),
            user.id
        );
    }

    #[tokio::test]
    async fn test_register_rejects_blank_and_duplicate() {
        let auth = service().await;
        assert!(matches!(
            auth.register(" ", "pw").await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            auth.register("ana", "").await,
            Err(AuthError::InvalidInput(_))
        ));
        auth.register("ana", "pw").await.unwrap();
        assert!(matches!(
            auth.register("ana", "pw2").await,
            Err(AuthError::UsernameTaken)
        ));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let auth = service().await;
        auth.register("ana", "pw").await.unwrap();
        assert!(matches!(
            auth.login("ana", "nope").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody", "pw").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate("made-up").await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_new_login_invalidates_previous_token() {
        let auth = service().await;
        auth.register("ana", "pw").await.unwrap();
        let first = auth.login("ana", "pw").await.unwrap();
        let second = auth.login("ana", "pw").await.unwrap();
        assert_ne!(first, second);
        assert!(matches!(
            auth.authenticate(&first).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(auth.authenticate(&second).await.is_ok());
    }

    #[tokio::test]
    async fn test_guest_is_stable() {
        let auth = service().await;
        let a = auth.ensure_guest().await.unwrap();
        let b = auth.ensure_guest().await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_guest_name_is_reserved() {
        let auth = service().await;
        for name in ["guest", " Guest ", "GUEST"] {
            assert!(matches!(
                auth.register(name, "pw").await,
                Err(AuthError::UsernameTaken)
            ));
        }
        let guest = auth.ensure_guest().await.unwrap();
        assert!(matches!(
            auth.login(GUEST_USERNAME, "").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert_eq!(auth.ensure_guest().await.unwrap(), guest);
    }
}
