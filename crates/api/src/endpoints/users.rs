//! User endpoints: follows.

use axum::{
    Router,
    extract::{Path, State},
    routing::{get, post},
};
use parley_common::AppResult;
use serde::Serialize;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResponse {
    pub is_following: bool,
    pub is_mutual: bool,
    /// Set when the follow opened (or found) a conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowStatusResponse {
    pub is_following: bool,
}

/// Follow or unfollow a user.
async fn toggle_follow(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(target_id): Path<String>,
) -> AppResult<ApiResponse<FollowResponse>> {
    let outcome = state.following_service.toggle(&user_id, &target_id).await?;

    for notification in &outcome.notifications {
        state.coordinator.push_notification(notification).await;
    }
    if let Some(opened) = &outcome.conversation {
        state.coordinator.conversation_opened(&opened.conversation).await;
    }

    Ok(ApiResponse::ok(FollowResponse {
        is_following: outcome.following,
        is_mutual: outcome.mutual,
        conversation_id: outcome.conversation.map(|c| c.conversation.id),
    }))
}

/// Whether the caller follows a user.
async fn follow_status(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(target_id): Path<String>,
) -> AppResult<ApiResponse<FollowStatusResponse>> {
    let is_following = state
        .following_service
        .is_following(&user_id, &target_id)
        .await?;
    Ok(ApiResponse::ok(FollowStatusResponse { is_following }))
}

/// Users router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{user_id}/follow", post(toggle_follow))
        .route("/{user_id}/follow-status", get(follow_status))
}
