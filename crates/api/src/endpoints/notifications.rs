//! Notifications endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use parley_common::AppResult;
use parley_core::NotificationPayload;
use serde::{Deserialize, Serialize};

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// List notifications query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    /// Maximum results (default: 20, max: 100)
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Cursor for pagination (before this ID)
    pub until_id: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
}

const fn default_limit() -> u64 {
    20
}

/// Mark-read request. Omitting `ids` marks everything.
#[derive(Debug, Default, Deserialize)]
pub struct MarkReadRequest {
    pub ids: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub count: u64,
}

/// List notifications, newest first.
async fn list(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<ApiResponse<Vec<NotificationPayload>>> {
    let notifications = state
        .notification_service
        .list(
            &user_id,
            query.limit,
            query.until_id.as_deref(),
            query.unread_only,
        )
        .await?;

    Ok(ApiResponse::ok(
        notifications.iter().map(NotificationPayload::from).collect(),
    ))
}

/// Count unread notifications.
async fn unread_count(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.count_unread(&user_id).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Mark notifications as read.
async fn mark_read(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<MarkReadRequest>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state
        .notification_service
        .mark_read(&user_id, req.ids.as_deref())
        .await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Mark one notification as read.
async fn mark_one_read(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.notification_service.mark_as_read(&user_id, &id).await?;
    Ok(crate::response::ok())
}

/// Delete one notification.
async fn delete_one(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.notification_service.delete(&user_id, &id).await?;
    Ok(crate::response::ok())
}

/// Delete every notification of the caller.
async fn delete_all(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.delete_all(&user_id).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Notifications router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/unread-count", get(unread_count))
        .route("/mark-read", post(mark_read))
        .route("/delete-all", delete(delete_all))
        .route("/{id}/read", put(mark_one_read))
        .route("/{id}", delete(delete_one))
}
