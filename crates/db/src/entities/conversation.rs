//! Conversation entity: a two-party chat.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Summary text of a conversation without any visible message.
pub const EMPTY_SUMMARY: &str = "No messages yet";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversation")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub user1_id: String,

    pub user2_id: String,

    /// Participants who removed the conversation from their list
    #[sea_orm(column_type = "JsonBinary")]
    pub deleted_by: Json,

    /// Summary of the latest visible message
    #[sea_orm(column_type = "Text")]
    pub last_message: String,

    #[sea_orm(nullable)]
    pub last_message_at: Option<DateTimeWithTimeZone>,

    /// Messages `user1` has not seen yet
    #[sea_orm(default_value = 0)]
    pub user1_unread: i32,

    /// Messages `user2` has not seen yet
    #[sea_orm(default_value = 0)]
    pub user2_unread: i32,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether `user_id` is one of the two participants.
    #[must_use]
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// The other participant, if `user_id` is a participant.
    #[must_use]
    pub fn partner_of(&self, user_id: &str) -> Option<&str> {
        if self.user1_id == user_id {
            Some(&self.user2_id)
        } else if self.user2_id == user_id {
            Some(&self.user1_id)
        } else {
            None
        }
    }

    /// Unread counter of `user_id`; zero for non-participants.
    #[must_use]
    pub fn unread_for(&self, user_id: &str) -> i32 {
        if self.user1_id == user_id {
            self.user1_unread
        } else if self.user2_id == user_id {
            self.user2_unread
        } else {
            0
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::User1Id",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User1,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::User2Id",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User2,

    #[sea_orm(has_many = "super::chat_message::Entity")]
    Messages,
}

impl Related<super::chat_message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
