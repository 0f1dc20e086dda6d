//! Chat message repository (the message store).

use std::sync::Arc;

use crate::entities::{ChatMessage, chat_message};
use parley_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Statement, Value,
};

/// Repository for chat message operations.
#[derive(Clone)]
pub struct ChatMessageRepository {
    db: Arc<DatabaseConnection>,
}

impl ChatMessageRepository {
    /// Create a new chat message repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a new message.
    pub async fn create(&self, model: chat_message::ActiveModel) -> AppResult<chat_message::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Persist changes to an existing message.
    pub async fn update(&self, model: chat_message::ActiveModel) -> AppResult<chat_message::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a message by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<chat_message::Model>> {
        ChatMessage::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find several messages by ID. Missing IDs are skipped.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<chat_message::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        ChatMessage::find()
            .filter(chat_message::Column::Id.is_in(ids.iter().map(String::as_str)))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Messages of a conversation in insertion order.
    ///
    /// Returns the `limit` newest messages older than `until_id`, oldest first.
    pub async fn find_in_conversation(
        &self,
        conversation_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<chat_message::Model>> {
        let mut query = ChatMessage::find()
            .filter(chat_message::Column::ConversationId.eq(conversation_id))
            .order_by_desc(chat_message::Column::Id);

        if let Some(id) = until_id {
            query = query.filter(chat_message::Column::Id.lt(id));
        }

        let mut messages = query
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        messages.reverse();
        Ok(messages)
    }

    /// The most recent message that is not deleted.
    pub async fn find_latest_visible(
        &self,
        conversation_id: &str,
    ) -> AppResult<Option<chat_message::Model>> {
        ChatMessage::find()
            .filter(chat_message::Column::ConversationId.eq(conversation_id))
            .filter(chat_message::Column::IsDeleted.eq(false))
            .order_by_desc(chat_message::Column::Id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// IDs of messages in a conversation sent by others that `user_id` hasn't seen.
    pub async fn find_unseen_ids(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<Vec<String>> {
        let sql = r"
            SELECT id FROM chat_message
            WHERE conversation_id = $1
                AND sender_id <> $2
                AND NOT (seen_by @> jsonb_build_array($2::text))
            ORDER BY id
        ";

        let rows = self
            .db
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [conversation_id.into(), user_id.into()],
            ))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            if let Ok(id) = row.try_get::<String>("", "id") {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Add `user_id` to `seen_by` of the listed messages.
    ///
    /// Only messages in `conversation_id` that `user_id` didn't send are
    /// eligible; those not yet containing `user_id` are updated in the same
    /// statement. Returns the eligible IDs in insertion order, whether or not
    /// they needed the update.
    pub async fn mark_seen(
        &self,
        conversation_id: &str,
        user_id: &str,
        message_ids: &[String],
    ) -> AppResult<Vec<String>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        // $1 = user, $2 = conversation, $3.. = message ids
        let placeholders = (0..message_ids.len())
            .map(|i| format!("${}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r"
            WITH eligible AS (
                SELECT id FROM chat_message
                WHERE conversation_id = $2
                    AND sender_id <> $1
                    AND id IN ({placeholders})
            ), marked AS (
                UPDATE chat_message
                SET seen_by = seen_by || jsonb_build_array($1::text)
                WHERE id IN (SELECT id FROM eligible)
                    AND NOT (seen_by @> jsonb_build_array($1::text))
                RETURNING id
            )
            SELECT id FROM eligible ORDER BY id
            "
        );

        let mut values: Vec<Value> = Vec::with_capacity(message_ids.len() + 2);
        values.push(user_id.into());
        values.push(conversation_id.into());
        values.extend(message_ids.iter().map(|id| Value::from(id.as_str())));

        let rows = self
            .db
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                values,
            ))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            if let Ok(id) = row.try_get::<String>("", "id") {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}
