//! Chat message entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::id_list;

/// Content written over a deleted message.
pub const TOMBSTONE: &str = "This message was deleted";

/// Attachment category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    #[sea_orm(string_value = "image")]
    Image,
    #[sea_orm(string_value = "video")]
    Video,
    #[sea_orm(string_value = "audio")]
    Audio,
    #[sea_orm(string_value = "document")]
    Document,
}

impl From<parley_common::AttachmentKind> for AttachmentKind {
    fn from(kind: parley_common::AttachmentKind) -> Self {
        match kind {
            parley_common::AttachmentKind::Image => Self::Image,
            parley_common::AttachmentKind::Video => Self::Video,
            parley_common::AttachmentKind::Audio => Self::Audio,
            parley_common::AttachmentKind::Document => Self::Document,
        }
    }
}

impl From<AttachmentKind> for parley_common::AttachmentKind {
    fn from(kind: AttachmentKind) -> Self {
        match kind {
            AttachmentKind::Image => Self::Image,
            AttachmentKind::Video => Self::Video,
            AttachmentKind::Audio => Self::Audio,
            AttachmentKind::Document => Self::Document,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chat_message")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub conversation_id: String,

    pub sender_id: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(nullable)]
    pub attachment_url: Option<String>,

    #[sea_orm(nullable)]
    pub attachment_kind: Option<AttachmentKind>,

    /// Preview frame for video attachments
    #[sea_orm(nullable)]
    pub thumbnail_url: Option<String>,

    /// Handle for releasing the stored attachment
    #[sea_orm(nullable)]
    pub deletion_handle: Option<String>,

    /// User IDs that have seen the message; always contains the sender
    #[sea_orm(column_type = "JsonBinary")]
    pub seen_by: Json,

    #[sea_orm(default_value = false)]
    pub is_edited: bool,

    #[sea_orm(default_value = false)]
    pub is_deleted: bool,

    #[sea_orm(nullable)]
    pub reply_to_id: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether the message carries an attachment.
    #[must_use]
    pub const fn has_attachment(&self) -> bool {
        self.attachment_url.is_some()
    }

    /// User IDs in `seen_by`.
    #[must_use]
    pub fn seen_by_ids(&self) -> Vec<String> {
        id_list::ids(&self.seen_by)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::conversation::Entity",
        from = "Column::ConversationId",
        to = "super::conversation::Column::Id",
        on_delete = "Cascade"
    )]
    Conversation,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::SenderId",
        to = "super::user::Column::Id"
    )]
    Sender,

    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ReplyToId",
        to = "Column::Id",
        on_delete = "SetNull"
    )]
    ReplyTo,
}

impl Related<super::conversation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversation.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sender.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
