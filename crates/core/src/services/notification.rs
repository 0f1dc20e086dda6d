//! Notification service.

use chrono::Utc;
use parley_common::{AppError, AppResult, IdGenerator};
use parley_db::{
    entities::notification::{self, NotificationKind},
    repositories::NotificationRepository,
};
use sea_orm::Set;

/// Largest page returned by [`NotificationService::list`].
pub const MAX_PAGE_SIZE: u64 = 100;

/// Notification service for business logic.
#[derive(Clone)]
pub struct NotificationService {
    notification_repo: NotificationRepository,
    id_gen: IdGenerator,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub const fn new(notification_repo: NotificationRepository) -> Self {
        Self {
            notification_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Tell `recipient_id` that `sender_name` sent them something in a conversation.
    ///
    /// `noun` is "message" or the attachment kind ("image", "video", ...).
    pub async fn create_new_message_notification(
        &self,
        recipient_id: &str,
        sender_name: &str,
        noun: &str,
        conversation_id: &str,
    ) -> AppResult<notification::Model> {
        self.create_internal(
            recipient_id,
            NotificationKind::NewMessage,
            format!("New {noun} from {sender_name}"),
            conversation_id,
        )
        .await
    }

    /// Tell `followee_id` about a follow. `text` is the full sentence.
    pub async fn create_follow_notification(
        &self,
        followee_id: &str,
        follower_id: &str,
        text: String,
    ) -> AppResult<notification::Model> {
        self.create_internal(followee_id, NotificationKind::Follow, text, follower_id)
            .await
    }

    async fn create_internal(
        &self,
        user_id: &str,
        kind: NotificationKind,
        message: String,
        related_id: &str,
    ) -> AppResult<notification::Model> {
        let model = notification::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user_id.to_string()),
            kind: Set(kind),
            message: Set(message),
            related_id: Set(related_id.to_string()),
            is_read: Set(false),
            created_at: Set(Utc::now().into()),
        };

        self.notification_repo.create(model).await
    }

    /// Get notifications for a user, newest first.
    pub async fn list(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
        unread_only: bool,
    ) -> AppResult<Vec<notification::Model>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        self.notification_repo
            .find_by_user(user_id, limit, until_id, unread_only)
            .await
    }

    /// Mark one notification as read. Only its owner may do so.
    pub async fn mark_as_read(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        self.find_owned(user_id, notification_id).await?;
        self.notification_repo
            .mark_many_as_read(user_id, &[notification_id.to_string()])
            .await?;
        Ok(())
    }

    /// Mark the listed notifications as read, or all of them when `ids` is `None`.
    pub async fn mark_read(&self, user_id: &str, ids: Option<&[String]>) -> AppResult<u64> {
        match ids {
            Some(ids) => self.notification_repo.mark_many_as_read(user_id, ids).await,
            None => self.notification_repo.mark_all_as_read(user_id).await,
        }
    }

    /// Count unread notifications.
    pub async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.count_unread(user_id).await
    }

    /// Delete one notification. Only its owner may do so.
    pub async fn delete(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        self.find_owned(user_id, notification_id).await?;
        self.notification_repo.delete(notification_id).await
    }

    /// Delete every notification of a user.
    pub async fn delete_all(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.delete_all_for_user(user_id).await
    }

    async fn find_owned(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> AppResult<notification::Model> {
        let notification = self
            .notification_repo
            .find_by_id(notification_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification not found: {notification_id}")))?;

        if notification.user_id != user_id {
            return Err(AppError::Forbidden(
                "Cannot modify another user's notification".to_string(),
            ));
        }
        Ok(notification)
    }
}
