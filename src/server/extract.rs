//! Request extractors.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::AuthError;
use crate::server::error::ApiError;
use crate::server::state::AppState;
use crate::storage::UserId;

/// The user a request acts for, resolved from the `Authorization` header.
///
/// Without a header the guest account is used when anonymous access is
/// enabled; an invalid token is always rejected.
#[derive(Clone, Copy, Debug)]
pub struct CurrentUser(pub UserId);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match (header, state.guest) {
            (Some(value), _) => Ok(Self(state.auth.authenticate(value).await?)),
            (None, Some(guest)) => Ok(Self(guest)),
            (None, None) => Err(AuthError::Unauthorized.into()),
        }
    }
}
