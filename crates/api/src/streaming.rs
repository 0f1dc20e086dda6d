//! WebSocket transport for the chat coordinator.
//!
//! The token is checked before the upgrade; a rejected client gets a plain
//! 401 and no socket.

#![allow(missing_docs)]

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use parley_common::{AppError, AppResult};
use parley_core::{ChatCoordinator, ClientEvent, ServerEvent};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::middleware::AppState;

/// Streaming query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Access token, for clients that cannot set headers on the upgrade.
    pub token: Option<String>,
}

fn admit(state: &AppState, headers: &HeaderMap, query: &StreamQuery) -> AppResult<String> {
    let header_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let token = header_token
        .or(query.token.as_deref())
        .ok_or(AppError::Unauthorized)?;
    state.token_verifier.verify(token)
}

/// WebSocket upgrade handler.
pub async fn streaming_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let user_id = match admit(&state, &headers, &query) {
        Ok(user_id) => user_id,
        Err(e) => {
            debug!("Rejected streaming connection");
            return e.into_response();
        }
    };

    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state.coordinator, user_id))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, coordinator: ChatCoordinator, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (ctx, mut events) = coordinator.connect(&user_id).await;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(text.as_str()) {
                            Ok(event) => coordinator.handle(&ctx, event).await,
                            Err(e) => {
                                debug!(error = %e, connection = %ctx.id, "Malformed client event");
                                coordinator
                                    .hub()
                                    .emit_to(ctx.id, ServerEvent::Error {
                                        message: format!("Malformed event: {e}"),
                                    })
                                    .await;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(user_id = %ctx.user_id, "Client closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            event = events.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, event = event.name(), "Failed to serialize event"),
                }
            }
        }
    }

    coordinator.disconnect(&ctx).await;
}
