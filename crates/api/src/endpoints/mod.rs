//! API endpoints.

mod chats;
mod notifications;
mod users;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/chats", chats::router())
        .nest("/notifications", notifications::router())
        .nest("/users", users::router())
}
