//! API middleware.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use parley_common::MediaStore;
use parley_core::{
    ChatCoordinator, ConversationService, FollowingService, MessagingService, NotificationService,
    TokenVerifier,
};

use crate::extractors::AuthenticatedUser;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub token_verifier: TokenVerifier,
    pub coordinator: ChatCoordinator,
    pub messaging_service: MessagingService,
    pub conversation_service: ConversationService,
    pub notification_service: NotificationService,
    pub following_service: FollowingService,
    pub media: Arc<dyn MediaStore>,
    pub max_upload_bytes: u64,
}

/// Token carried in an `Authorization: Bearer` header.
pub fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Authentication middleware.
///
/// Requests with a valid token get an [`AuthenticatedUser`] extension; the
/// rest pass through and are rejected by extractors that need identity.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&req) {
        match state.token_verifier.verify(token) {
            Ok(user_id) => {
                req.extensions_mut().insert(AuthenticatedUser(user_id));
            }
            Err(e) => tracing::debug!(error = %e, "Ignoring invalid bearer token"),
        }
    }

    next.run(req).await
}
