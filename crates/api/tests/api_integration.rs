//! API integration tests.
//!
//! These tests drive the full router, auth middleware included, against a
//! mock database.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::redundant_clone)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use chrono::Utc;
use parley_api::{app, middleware::AppState};
use parley_common::{AppError, AppResult, MediaStore, StoredMedia};
use parley_core::{
    ChatCoordinator, ConversationService, FollowingService, InMemoryPresence, MessagingService,
    NotificationService, RoomHub, ServerEvent, TokenVerifier,
};
use parley_db::{
    entities::{chat_message, conversation, id_list, notification, user},
    repositories::{
        ChatMessageRepository, ConversationRepository, FollowingRepository,
        NotificationRepository, UserRepository,
    },
};
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
use serde_json::Value;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

/// Media store that keeps uploads in memory.
#[derive(Default)]
struct RecordingStore {
    uploads: Mutex<Vec<String>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait::async_trait]
impl MediaStore for RecordingStore {
    async fn upload(&self, key: &str, data: &[u8], _mime: &str) -> AppResult<StoredMedia> {
        self.uploads.lock().unwrap().push(key.to_string());
        self.files
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(StoredMedia {
            url: self.public_url(key),
            deletion_handle: key.to_string(),
            thumbnail_url: None,
            size: data.len() as u64,
            md5: String::new(),
        })
    }

    async fn delete(&self, _deletion_handle: &str) -> AppResult<()> {
        Ok(())
    }

    async fn read(&self, deletion_handle: &str) -> AppResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(deletion_handle)
            .cloned()
            .ok_or_else(|| AppError::NotFound(deletion_handle.to_string()))
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://localhost/media/{key}")
    }
}

fn create_test_conversation(id: &str, user1: &str, user2: &str) -> conversation::Model {
    conversation::Model {
        id: id.to_string(),
        user1_id: user1.to_string(),
        user2_id: user2.to_string(),
        deleted_by: id_list::empty(),
        last_message: conversation::EMPTY_SUMMARY.to_string(),
        last_message_at: None,
        user1_unread: 0,
        user2_unread: 0,
        created_at: Utc::now().into(),
    }
}

fn create_test_message(id: &str, sender: &str, content: &str) -> chat_message::Model {
    let now = Utc::now();
    chat_message::Model {
        id: id.to_string(),
        conversation_id: "c1".to_string(),
        sender_id: sender.to_string(),
        content: content.to_string(),
        attachment_url: None,
        attachment_kind: None,
        thumbnail_url: None,
        deletion_handle: None,
        seen_by: id_list::single(sender),
        is_edited: false,
        is_deleted: false,
        reply_to_id: None,
        created_at: now.into(),
        updated_at: now.into(),
    }
}

fn create_test_document(id: &str, sender: &str, handle: &str) -> chat_message::Model {
    let mut message = create_test_message(id, sender, "");
    message.attachment_url = Some(format!("http://localhost/media/{handle}"));
    message.attachment_kind = Some(chat_message::AttachmentKind::Document);
    message.deletion_handle = Some(handle.to_string());
    message
}

fn create_test_user(id: &str, name: &str) -> user::Model {
    user::Model {
        id: id.to_string(),
        username: id.to_string(),
        name: Some(name.to_string()),
        avatar_url: None,
        created_at: Utc::now().into(),
    }
}

/// Create test app state over one mock database.
fn create_test_state(db: DatabaseConnection, media: Arc<RecordingStore>, max_upload_bytes: u64) -> AppState {
    let db = Arc::new(db);

    let message_repo = ChatMessageRepository::new(Arc::clone(&db));
    let conversation_repo = ConversationRepository::new(Arc::clone(&db));
    let user_repo = UserRepository::new(Arc::clone(&db));
    let notification_repo = NotificationRepository::new(Arc::clone(&db));
    let following_repo = FollowingRepository::new(Arc::clone(&db));

    let mut messaging_service =
        MessagingService::new(message_repo, conversation_repo.clone(), user_repo.clone());
    messaging_service.set_media_store(media.clone());
    let conversation_service = ConversationService::new(conversation_repo, user_repo.clone());
    let notification_service = NotificationService::new(notification_repo);
    let following_service = FollowingService::new(
        following_repo,
        user_repo,
        conversation_service.clone(),
        notification_service.clone(),
    );

    let coordinator = ChatCoordinator::new(
        RoomHub::new(),
        Arc::new(InMemoryPresence::new()),
        messaging_service.clone(),
        conversation_service.clone(),
        notification_service.clone(),
    );

    AppState {
        token_verifier: TokenVerifier::new(SECRET),
        coordinator,
        messaging_service,
        conversation_service,
        notification_service,
        following_service,
        media,
        max_upload_bytes,
    }
}

fn create_test_router(db: DatabaseConnection) -> Router {
    app(create_test_state(db, Arc::new(RecordingStore::default()), 1024))
}

fn empty_db() -> DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Postgres).into_connection()
}

fn token(user_id: &str) -> String {
    TokenVerifier::new(SECRET)
        .issue(user_id, chrono::Duration::hours(1))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn multipart_text(boundary: &str, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    body.into_bytes()
}

fn multipart_file(boundary: &str, mime: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"tempId\"\r\n\r\nt-1\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"clip.bin\"\r\n\
         Content-Type: {mime}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn test_chats_without_token_is_unauthorized() {
    let app = create_test_router(empty_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chats")
                .method("GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let app = create_test_router(empty_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/notifications/unread-count")
                .method("GET")
                .header("Authorization", "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_streaming_rejects_missing_token_before_upgrade() {
    let app = create_test_router(empty_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/streaming")
                .method("GET")
                .header("Connection", "upgrade")
                .header("Upgrade", "websocket")
                .header("Sec-WebSocket-Version", "13")
                .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_streaming_accepts_query_token() {
    let app = create_test_router(empty_db());

    // A plain request carries no upgrade, so admission passes and the
    // upgrade extractor is what rejects it.
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/streaming?token={}", token("alice")))
                .method("GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_list_chats() {
    let mut conv = create_test_conversation("c1", "alice", "bob");
    conv.user1_unread = 2;
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[conv]])
        .append_query_results([[create_test_user("bob", "Bob")]])
        .into_connection();
    let app = create_test_router(db);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chats")
                .method("GET")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"][0]["id"], "c1");
    assert_eq!(body["data"][0]["partner"]["name"], "Bob");
    assert_eq!(body["data"][0]["unreadCount"], 2);
    assert_eq!(body["data"][0]["lastMessage"], conversation::EMPTY_SUMMARY);
}

#[tokio::test]
async fn test_open_chat_with_self_is_bad_request() {
    let app = create_test_router(empty_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chats")
                .method("POST")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"userId":"alice"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_open_chat_creates_conversation() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<conversation::Model>::new()])
        .append_query_results([[create_test_user("bob", "Bob")]])
        .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
        .append_query_results([[create_test_user("bob", "Bob")]])
        .into_connection();
    let app = create_test_router(db);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chats")
                .method("POST")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"userId":"bob"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["id"], "c1");
    assert_eq!(body["data"]["partner"]["id"], "bob");
}

#[tokio::test]
async fn test_outsider_cannot_read_messages() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
        .into_connection();
    let app = create_test_router(db);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chats/c1/messages?limit=20")
                .method("GET")
                .header("Authorization", format!("Bearer {}", token("mallory")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_missing_chat_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<conversation::Model>::new()])
        .into_connection();
    let app = create_test_router(db);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chats/nope/messages")
                .method("GET")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["error"]["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_mark_seen_rejects_oversized_batch() {
    let app = create_test_router(empty_db());
    let ids: Vec<String> = (0..501).map(|i| format!("m{i}")).collect();
    let payload = serde_json::json!({ "messageIds": ids }).to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chats/c1/seen")
                .method("PUT")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .header("Content-Type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected_before_storing() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
        .into_connection();
    let media = Arc::new(RecordingStore::default());
    let app = app(create_test_state(db, media.clone(), 8));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chats/c1/messages")
                .method("POST")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .header("Content-Type", "multipart/form-data; boundary=XBOUNDARY")
                .body(Body::from(multipart_file("XBOUNDARY", "video/mp4", &[0u8; 64])))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(media.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_attachment_type_is_rejected() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
        .into_connection();
    let media = Arc::new(RecordingStore::default());
    let app = app(create_test_state(db, media.clone(), 1024));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chats/c1/messages")
                .method("POST")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .header("Content-Type", "multipart/form-data; boundary=XBOUNDARY")
                .body(Body::from(multipart_file(
                    "XBOUNDARY",
                    "application/x-msdownload",
                    b"MZ",
                )))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(media.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_all_notifications() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 3,
        }])
        .into_connection();
    let app = create_test_router(db);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/notifications/delete-all")
                .method("DELETE")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["count"], 3);
}

#[tokio::test]
async fn test_follow_yourself_is_bad_request() {
    let app = create_test_router(empty_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/users/alice/follow")
                .method("POST")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_follow_status() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<parley_db::entities::following::Model>::new()])
        .into_connection();
    let app = create_test_router(db);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/users/bob/follow-status")
                .method("GET")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["isFollowing"], false);
}

#[tokio::test]
async fn test_fallback_send_reaches_room() {
    let conv = create_test_conversation("c1", "alice", "bob");
    let mut updated = conv.clone();
    updated.last_message = "hi".to_string();
    updated.user2_unread = 1;

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[conv]])
        .append_query_results([[create_test_message("m1", "alice", "hi")]])
        .append_query_results([[create_test_user("alice", "Alice")]])
        .append_query_results([[updated]])
        .append_query_results([[notification::Model {
            id: "n1".to_string(),
            user_id: "bob".to_string(),
            kind: notification::NotificationKind::NewMessage,
            message: "New message from Alice".to_string(),
            related_id: "c1".to_string(),
            is_read: false,
            created_at: Utc::now().into(),
        }]])
        .append_exec_results([
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
        ])
        .into_connection();
    let media = Arc::new(RecordingStore::default());
    let state = create_test_state(db, media.clone(), 1024);
    let (bob, mut rx) = state.coordinator.connect("bob").await;
    state.coordinator.hub().join(bob.id, "c1").await;
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chats/c1/messages")
                .method("POST")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .header("Content-Type", "multipart/form-data; boundary=XBOUNDARY")
                .body(Body::from(multipart_text(
                    "XBOUNDARY",
                    &[("content", "hi"), ("tempId", "t-1")],
                )))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["content"], "hi");
    assert_eq!(body["data"]["tempId"], "t-1");
    assert!(media.uploads.lock().unwrap().is_empty());

    let ServerEvent::ReceiveMessage(payload) = rx.try_recv().unwrap() else {
        panic!("expected receive_message first");
    };
    assert_eq!(serde_json::to_value(&payload).unwrap(), body["data"]);
    assert!(matches!(rx.try_recv().unwrap(), ServerEvent::ChatUpdated(_)));
}

#[tokio::test]
async fn test_oversized_text_field_is_rejected() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
        .into_connection();
    let app = create_test_router(db);
    let content = "x".repeat(64 * 1024);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chats/c1/messages")
                .method("POST")
                .header("Authorization", format!("Bearer {}", token("alice")))
                .header("Content-Type", "multipart/form-data; boundary=XBOUNDARY")
                .body(Body::from(multipart_text(
                    "XBOUNDARY",
                    &[("content", content.as_str())],
                )))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

fn download_request(user_id: &str) -> Request<Body> {
    Request::builder()
        .uri("/api/chats/c1/messages/m1/file")
        .method("GET")
        .header("Authorization", format!("Bearer {}", token(user_id)))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_participant_downloads_document() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_document("m1", "alice", "chat/doc.pdf")]])
        .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
        .into_connection();
    let media = Arc::new(RecordingStore::default());
    media
        .files
        .lock()
        .unwrap()
        .insert("chat/doc.pdf".to_string(), b"%PDF-1.7".to_vec());
    let app = app(create_test_state(db, media, 1024));

    let response = app.oneshot(download_request("bob")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/pdf");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"document-m1.pdf\""
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"%PDF-1.7");
}

#[tokio::test]
async fn test_outsider_cannot_download_document() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_document("m1", "alice", "chat/doc.pdf")]])
        .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
        .into_connection();
    let app = create_test_router(db);

    let response = app.oneshot(download_request("mallory")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_download_without_document_is_bad_request() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_message("m1", "alice", "just text")]])
        .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
        .into_connection();
    let app = create_test_router(db);

    let response = app.oneshot(download_request("bob")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_missing_message_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<chat_message::Model>::new()])
        .into_connection();
    let app = create_test_router(db);

    let response = app.oneshot(download_request("bob")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
