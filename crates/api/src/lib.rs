//! HTTP API layer for parley.
//!
//! - **Endpoints**: conversations, the multipart message fallback, notifications, follows
//! - **Extractors**: bearer-token identity
//! - **Streaming**: the WebSocket transport for the chat coordinator
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod streaming;

use axum::{Router, routing::get};

pub use endpoints::router;
pub use streaming::streaming_handler;

use crate::middleware::{AppState, auth_middleware};

/// Full application router: `/streaming` plus the REST API under `/api`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/streaming", get(streaming_handler))
        .nest("/api", router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}
