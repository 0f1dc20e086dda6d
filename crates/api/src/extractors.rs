//! Request extractors.

use axum::{extract::FromRequestParts, http::request::Parts};
use parley_common::AppError;

/// ID of the user whose bearer token was verified by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Authenticated user extractor.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|u| Self(u.0.clone()))
            .ok_or(AppError::Unauthorized)
    }
}
