//! Resolution of the acting user from request headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use nodehook_domain::user::User;

use crate::error::ApiError;
use crate::state::{AppState, Repositories};

/// Header carrying the name of the user a request acts as.
pub const USER_HEADER: &str = "x-nodehook-user";

/// The user named by the [`USER_HEADER`] header.
///
/// Locked users still resolve here; the services refuse them.
#[derive(Debug, Clone)]
pub struct Actor(pub User);

impl<R: Repositories> FromRequestParts<AppState<R>> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<R>,
    ) -> Result<Self, Self::Rejection> {
        let name = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;
        let user = state
            .users
            .find_by_name(name)
            .map_err(|_| ApiError::Unauthenticated)?;
        Ok(Self(user))
    }
}
