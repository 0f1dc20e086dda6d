//! Conversation and message endpoints.
//!
//! Message writes here go through the same coordinator operations as the
//! socket events, so room members see HTTP-originated changes live.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::Field},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use parley_common::{AppError, AppResult, AttachmentKind, generate_storage_key, validate_attachment};
use parley_core::{ConversationListItem, CreateMessageInput, MessagePayload, NewAttachment};
use parley_db::entities::chat_message;
use serde::Deserialize;
use validator::Validate;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 100;
/// Ceiling for a text part of a multipart send (`content`, `tempId`, `replyTo`).
const MAX_TEXT_FIELD_BYTES: usize = 16 * 1024;

/// Open conversation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChatRequest {
    pub user_id: String,
}

/// Message page query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub until_id: Option<String>,
}

const fn default_limit() -> u64 {
    DEFAULT_PAGE_SIZE
}

/// Edit message request.
#[derive(Debug, Deserialize, Validate)]
pub struct EditMessageRequest {
    #[validate(length(max = 4000, message = "Message content is too long"))]
    pub content: String,
}

/// Mark-seen request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SeenRequest {
    #[validate(length(max = 500, message = "At most 500 messages can be marked at once"))]
    pub message_ids: Vec<String>,
}

/// Fields of a multipart send after parsing.
#[derive(Default)]
struct MultipartSend {
    content: String,
    temp_id: Option<String>,
    reply_to: Option<String>,
    file: Option<UploadedFile>,
}

struct UploadedFile {
    name: String,
    mime: String,
    data: Vec<u8>,
}

/// List the caller's conversations.
async fn list_chats(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<ConversationListItem>>> {
    let items = state.conversation_service.list_for_user(&user_id).await?;
    Ok(ApiResponse::ok(items))
}

/// Get or create the conversation with another user.
async fn open_chat(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<OpenChatRequest>,
) -> AppResult<Response> {
    let opened = state
        .conversation_service
        .get_or_create(&user_id, &req.user_id)
        .await?;

    if opened.created {
        state.coordinator.conversation_opened(&opened.conversation).await;
    }

    let item = state
        .conversation_service
        .list_item_for(&opened.conversation, &user_id)
        .await?;
    let status = if opened.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::ok(item))).into_response())
}

/// Hide a conversation for the caller.
async fn delete_chat(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state
        .coordinator
        .delete_conversation(&user_id, &chat_id)
        .await?;
    Ok(crate::response::ok())
}

/// Page through a conversation's messages, oldest first.
async fn list_messages(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> AppResult<ApiResponse<Vec<MessagePayload>>> {
    let conversation = state
        .conversation_service
        .get_for_participant(&chat_id, &user_id)
        .await?;

    let messages = state
        .messaging_service
        .list_messages(
            &conversation.id,
            query.limit.clamp(1, MAX_PAGE_SIZE),
            query.until_id.as_deref(),
        )
        .await?;
    Ok(ApiResponse::ok(messages))
}

/// Read a text part chunk by chunk, rejecting it once it passes `max_bytes`.
async fn read_text_field(field: &mut Field<'_>, max_bytes: usize) -> AppResult<String> {
    let mut data = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if data.len() + chunk.len() > max_bytes {
            return Err(AppError::Validation(format!(
                "Form field exceeds the {max_bytes} byte limit"
            )));
        }
        data.extend_from_slice(&chunk);
    }
    String::from_utf8(data).map_err(|_| AppError::BadRequest("Form field is not valid UTF-8".to_string()))
}

/// Read a multipart send, enforcing size ceilings while each part streams in.
async fn read_send_form(multipart: &mut Multipart, max_bytes: u64) -> AppResult<MultipartSend> {
    let mut form = MultipartSend::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("attachment").to_string();
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                validate_attachment(&mime, 0, max_bytes)?;

                let mut data = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?
                {
                    if (data.len() + chunk.len()) as u64 > max_bytes {
                        return Err(AppError::Validation(format!(
                            "Attachment exceeds the {max_bytes} byte limit"
                        )));
                    }
                    data.extend_from_slice(&chunk);
                }

                form.file = Some(UploadedFile {
                    name: file_name,
                    mime,
                    data,
                });
            }
            "content" | "tempId" | "replyTo" => {
                let value = read_text_field(&mut field, MAX_TEXT_FIELD_BYTES).await?;
                match name.as_str() {
                    "content" => form.content = value,
                    "tempId" => form.temp_id = Some(value).filter(|v| !v.is_empty()),
                    _ => form.reply_to = Some(value).filter(|v| !v.is_empty()),
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Send a message over HTTP, optionally with an attachment.
async fn send_message(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<ApiResponse<MessagePayload>> {
    let conversation = state
        .conversation_service
        .get_for_participant(&chat_id, &user_id)
        .await?;

    let form = read_send_form(&mut multipart, state.max_upload_bytes).await?;

    let attachment = match form.file {
        Some(file) => {
            let kind: AttachmentKind =
                validate_attachment(&file.mime, file.data.len() as u64, state.max_upload_bytes)?;
            let key = generate_storage_key(&user_id, &file.name);
            let stored = state.media.upload(&key, &file.data, &file.mime).await?;
            tracing::debug!(user_id = %user_id, key = %key, size = stored.size, md5 = %stored.md5, "Attachment stored");

            Some(NewAttachment {
                url: stored.url,
                kind,
                thumbnail_url: stored.thumbnail_url,
                deletion_handle: Some(stored.deletion_handle),
            })
        }
        None => None,
    };
    let deletion_handle = attachment.as_ref().and_then(|a| a.deletion_handle.clone());

    let input = CreateMessageInput {
        content: form.content,
        reply_to: form.reply_to,
        attachment,
    };

    let message = match state
        .messaging_service
        .create_message(&conversation, &user_id, input)
        .await
    {
        Ok(message) => message,
        Err(e) => {
            if let Some(handle) = deletion_handle {
                if let Err(release) = state.media.delete(&handle).await {
                    tracing::warn!(error = %release, handle = %handle, "Failed to release orphaned upload");
                }
            }
            return Err(e);
        }
    };

    let payload = state
        .coordinator
        .publish_new_message(&conversation, &message, form.temp_id, None)
        .await?;
    Ok(ApiResponse::ok(payload))
}

/// Load a message and check it belongs to the conversation in the path.
async fn message_in_chat(
    state: &AppState,
    chat_id: &str,
    message_id: &str,
) -> AppResult<chat_message::Model> {
    let message = state.messaging_service.get_message(message_id).await?;
    if message.conversation_id != chat_id {
        return Err(AppError::NotFound(format!("Message not found: {message_id}")));
    }
    Ok(message)
}

/// Edit a message.
async fn edit_message(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(String, String)>,
    Json(req): Json<EditMessageRequest>,
) -> AppResult<ApiResponse<MessagePayload>> {
    req.validate()?;
    message_in_chat(&state, &chat_id, &message_id).await?;

    let payload = state
        .coordinator
        .edit_message(&user_id, &message_id, &req.content)
        .await?;
    Ok(ApiResponse::ok(payload))
}

/// Delete a message.
async fn delete_message(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(String, String)>,
) -> AppResult<ApiResponse<MessagePayload>> {
    message_in_chat(&state, &chat_id, &message_id).await?;

    let payload = state
        .coordinator
        .delete_message(&user_id, &message_id)
        .await?;
    Ok(ApiResponse::ok(payload))
}

/// Download the document attached to a message. Participants only.
async fn download_file(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let message = message_in_chat(&state, &chat_id, &message_id).await?;
    state
        .conversation_service
        .get_for_participant(&chat_id, &user_id)
        .await?;

    let handle = match (message.attachment_kind, message.deletion_handle.as_deref()) {
        (Some(kind), Some(handle)) if AttachmentKind::from(kind) == AttachmentKind::Document => {
            handle
        }
        _ => {
            return Err(AppError::BadRequest(
                "No document attached to this message".to_string(),
            ));
        }
    };

    let data = state.media.read(handle).await?;
    tracing::debug!(user_id = %user_id, message_id = %message.id, size = data.len(), "Document downloaded");

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"document-{message_id}.pdf\""),
            ),
        ],
        data,
    )
        .into_response())
}

/// Mark messages as seen.
async fn mark_seen(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(req): Json<SeenRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;
    state
        .coordinator
        .mark_messages_seen(&user_id, &chat_id, &req.message_ids)
        .await?;
    Ok(crate::response::ok())
}

/// Chats router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_chats).post(open_chat))
        .route("/{chat_id}", delete(delete_chat))
        .route(
            "/{chat_id}/messages",
            get(list_messages).merge(post(send_message).layer(DefaultBodyLimit::disable())),
        )
        .route(
            "/{chat_id}/messages/{message_id}",
            put(edit_message).delete(delete_message),
        )
        .route("/{chat_id}/messages/{message_id}/file", get(download_file))
        .route("/{chat_id}/seen", put(mark_seen))
}
