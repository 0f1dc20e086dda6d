//! Socket protocol: inbound and outbound events and their payloads.
//!
//! Frames are JSON objects `{ "event": <name>, "data": <payload> }` with
//! camelCase payload fields.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parley_common::AttachmentKind;
use parley_db::entities::{chat_message, conversation, notification, user};
use serde::{Deserialize, Serialize};

/// Display name for a sender whose account no longer exists.
pub const DELETED_USER_NAME: &str = "User deleted";

/// Preview content of a reply whose target was deleted.
pub const DELETED_REPLY_PREVIEW: &str = "Deleted message";

/// Events a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    Register { user_id: String },
    JoinChat { conversation_id: String },
    Typing { conversation_id: String, user_id: String },
    SendMessage(SendMessageData),
    EditMessage { message_id: String, content: String },
    DeleteMessage { message_id: String },
    MarkMessagesSeen {
        conversation_id: String,
        message_ids: Vec<String>,
    },
}

/// Payload of `send_message`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageData {
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub content: String,
    pub temp_id: Option<String>,
    pub reply_to: Option<String>,
    pub attachment: Option<AttachmentRef>,
}

/// An attachment that was already uploaded out of band.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub url: String,
    pub kind: AttachmentKind,
    pub thumbnail_url: Option<String>,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    ReceiveMessage(MessagePayload),
    MessageError {
        temp_id: Option<String>,
        error: String,
    },
    ChatUpdated(ChatUpdatedPayload),
    MessagesSeen {
        conversation_id: String,
        message_ids: Vec<String>,
        user_id: String,
    },
    MessageUpdated(MessagePayload),
    MessageDeleted(MessagePayload),
    ReceiveNotification(NotificationPayload),
    UnseenMessages {
        conversation_id: String,
        message_ids: Vec<String>,
    },
    Typing {
        conversation_id: String,
        user_id: String,
    },
    ChatDeleted { conversation_id: String },
    Error { message: String },
}

impl ServerEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => "receive_message",
            Self::MessageError { .. } => "message_error",
            Self::ChatUpdated(_) => "chat_updated",
            Self::MessagesSeen { .. } => "messages_seen",
            Self::MessageUpdated(_) => "message_updated",
            Self::MessageDeleted(_) => "message_deleted",
            Self::ReceiveNotification(_) => "receive_notification",
            Self::UnseenMessages { .. } => "unseen_messages",
            Self::Typing { .. } => "typing",
            Self::ChatDeleted { .. } => "chat_deleted",
            Self::Error { .. } => "error",
        }
    }
}

/// Display fields of a user as shown next to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub is_deleted: bool,
}

impl UserSummary {
    /// Resolve `id` against a loaded user row. A missing row means the account is gone.
    #[must_use]
    pub fn resolve(id: &str, user: Option<&user::Model>) -> Self {
        match user {
            Some(u) => Self {
                id: u.id.clone(),
                name: u.display_name().to_string(),
                avatar_url: u.avatar_url.clone(),
                is_deleted: false,
            },
            None => Self {
                id: id.to_string(),
                name: DELETED_USER_NAME.to_string(),
                avatar_url: None,
                is_deleted: true,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    pub url: String,
    pub kind: AttachmentKind,
    pub thumbnail_url: Option<String>,
}

impl AttachmentPayload {
    fn of(message: &chat_message::Model) -> Option<Self> {
        if message.is_deleted {
            return None;
        }
        let url = message.attachment_url.clone()?;
        Some(Self {
            url,
            kind: message.attachment_kind.map_or(AttachmentKind::Document, Into::into),
            thumbnail_url: message.thumbnail_url.clone(),
        })
    }
}

/// Preview of the message a reply points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub id: String,
    pub content: String,
    pub sender: UserSummary,
    pub attachment: Option<AttachmentPayload>,
    pub is_deleted: bool,
}

impl ReplyPreview {
    #[must_use]
    pub fn new(target: &chat_message::Model, sender: UserSummary) -> Self {
        let content = if target.is_deleted {
            DELETED_REPLY_PREVIEW.to_string()
        } else {
            target.content.clone()
        };

        Self {
            id: target.id.clone(),
            content,
            sender,
            attachment: AttachmentPayload::of(target),
            is_deleted: target.is_deleted,
        }
    }
}

/// A message as delivered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub conversation_id: String,
    pub sender: UserSummary,
    pub content: String,
    pub attachment: Option<AttachmentPayload>,
    pub seen_by: Vec<String>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub reply_to: Option<ReplyPreview>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub temp_id: Option<String>,
}

impl MessagePayload {
    #[must_use]
    pub fn new(
        message: &chat_message::Model,
        sender: UserSummary,
        reply_to: Option<ReplyPreview>,
        temp_id: Option<String>,
    ) -> Self {
        Self {
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            sender,
            content: message.content.clone(),
            attachment: AttachmentPayload::of(message),
            seen_by: message.seen_by_ids(),
            is_edited: message.is_edited,
            is_deleted: message.is_deleted,
            reply_to,
            created_at: message.created_at.with_timezone(&Utc),
            updated_at: message.updated_at.with_timezone(&Utc),
            temp_id,
        }
    }
}

/// Summary of a conversation after it changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUpdatedPayload {
    pub conversation_id: String,
    pub last_message: String,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Unread count per participant ID.
    pub unread_counts: BTreeMap<String, i32>,
}

impl From<&conversation::Model> for ChatUpdatedPayload {
    fn from(c: &conversation::Model) -> Self {
        Self {
            conversation_id: c.id.clone(),
            last_message: c.last_message.clone(),
            last_message_at: c.last_message_at.map(|t| t.with_timezone(&Utc)),
            unread_counts: BTreeMap::from([
                (c.user1_id.clone(), c.user1_unread),
                (c.user2_id.clone(), c.user2_unread),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: String,
    pub user_id: String,
    pub kind: notification::NotificationKind,
    pub message: String,
    pub related_id: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&notification::Model> for NotificationPayload {
    fn from(n: &notification::Model) -> Self {
        Self {
            id: n.id.clone(),
            user_id: n.user_id.clone(),
            kind: n.kind,
            message: n.message.clone(),
            related_id: n.related_id.clone(),
            is_read: n.is_read,
            created_at: n.created_at.with_timezone(&Utc),
        }
    }
}
