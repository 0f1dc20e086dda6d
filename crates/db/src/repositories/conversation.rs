//! Conversation repository.

use std::sync::Arc;

use crate::entities::{Conversation, conversation};
use parley_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbBackend,
    EntityTrait, QueryFilter, QueryOrder, Statement, prelude::DateTimeWithTimeZone,
    sea_query::Expr,
};

/// Conversation repository for database operations.
#[derive(Clone)]
pub struct ConversationRepository {
    db: Arc<DatabaseConnection>,
}

/// Unread counter column of `user_id` in `conversation`.
fn unread_column(
    conversation: &conversation::Model,
    user_id: &str,
) -> Option<conversation::Column> {
    if conversation.user1_id == user_id {
        Some(conversation::Column::User1Unread)
    } else if conversation.user2_id == user_id {
        Some(conversation::Column::User2Unread)
    } else {
        None
    }
}

impl ConversationRepository {
    /// Create a new conversation repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a conversation by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<conversation::Model>> {
        Conversation::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the conversation between two users, in either slot order.
    pub async fn find_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> AppResult<Option<conversation::Model>> {
        Conversation::find()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(conversation::Column::User1Id.eq(user_a))
                            .add(conversation::Column::User2Id.eq(user_b)),
                    )
                    .add(
                        Condition::all()
                            .add(conversation::Column::User1Id.eq(user_b))
                            .add(conversation::Column::User2Id.eq(user_a)),
                    ),
            )
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new conversation.
    pub async fn create(
        &self,
        model: conversation::ActiveModel,
    ) -> AppResult<conversation::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Every conversation `user_id` participates in, soft-deleted ones included.
    pub async fn find_by_participant(&self, user_id: &str) -> AppResult<Vec<conversation::Model>> {
        Conversation::find()
            .filter(
                Condition::any()
                    .add(conversation::Column::User1Id.eq(user_id))
                    .add(conversation::Column::User2Id.eq(user_id)),
            )
            .order_by_asc(conversation::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Conversations listed for `user_id`: not soft-deleted by them, newest activity first.
    pub async fn find_visible_for_user(
        &self,
        user_id: &str,
    ) -> AppResult<Vec<conversation::Model>> {
        let sql = r"
            SELECT
                id, user1_id, user2_id, deleted_by, last_message, last_message_at,
                user1_unread, user2_unread, created_at
            FROM conversation
            WHERE (user1_id = $1 OR user2_id = $1)
                AND NOT (deleted_by @> jsonb_build_array($1::text))
            ORDER BY last_message_at DESC NULLS LAST, created_at DESC
        ";

        Conversation::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [user_id.into()],
            ))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Overwrite the summary. Concurrent writers: last one wins.
    pub async fn update_summary(
        &self,
        id: &str,
        last_message: &str,
        last_message_at: Option<DateTimeWithTimeZone>,
    ) -> AppResult<()> {
        Conversation::update_many()
            .col_expr(conversation::Column::LastMessage, Expr::value(last_message))
            .col_expr(
                conversation::Column::LastMessageAt,
                Expr::value(last_message_at),
            )
            .filter(conversation::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Increment the unread counter of `recipient_id` atomically.
    pub async fn increment_unread(
        &self,
        conversation: &conversation::Model,
        recipient_id: &str,
    ) -> AppResult<()> {
        let column = unread_column(conversation, recipient_id).ok_or_else(|| {
            AppError::Forbidden(format!("{recipient_id} is not a participant"))
        })?;

        Conversation::update_many()
            .col_expr(column, Expr::col(column).add(1))
            .filter(conversation::Column::Id.eq(&conversation.id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Reset the unread counter of `user_id` to zero.
    pub async fn reset_unread(
        &self,
        conversation: &conversation::Model,
        user_id: &str,
    ) -> AppResult<()> {
        let column = unread_column(conversation, user_id)
            .ok_or_else(|| AppError::Forbidden(format!("{user_id} is not a participant")))?;

        Conversation::update_many()
            .col_expr(column, Expr::value(0))
            .filter(conversation::Column::Id.eq(&conversation.id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Add `user_id` to `deleted_by` unless already present.
    ///
    /// Returns whether the row changed.
    pub async fn mark_deleted_for(&self, id: &str, user_id: &str) -> AppResult<bool> {
        let sql = r"
            UPDATE conversation
            SET deleted_by = deleted_by || jsonb_build_array($1::text)
            WHERE id = $2
                AND NOT (deleted_by @> jsonb_build_array($1::text))
        ";

        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [user_id.into(), id.into()],
            ))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
