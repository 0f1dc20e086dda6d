//! Following service.
//!
//! A follow that becomes mutual opens a conversation between the pair.

use chrono::Utc;
use parley_common::{AppError, AppResult, IdGenerator};
use parley_db::{
    entities::{following, notification},
    repositories::{FollowingRepository, UserRepository},
};
use sea_orm::Set;

use super::conversation::{ConversationService, OpenedConversation};
use super::notification::NotificationService;

/// What a follow toggle changed.
#[derive(Debug, Clone, Default)]
pub struct FollowOutcome {
    /// Whether the caller follows the target afterwards.
    pub following: bool,
    pub mutual: bool,
    /// Set when the follow became mutual.
    pub conversation: Option<OpenedConversation>,
    /// Notifications to push to their recipients.
    pub notifications: Vec<notification::Model>,
}

/// Following service.
#[derive(Clone)]
pub struct FollowingService {
    following_repo: FollowingRepository,
    user_repo: UserRepository,
    conversation_service: ConversationService,
    notification_service: NotificationService,
    id_gen: IdGenerator,
}

impl FollowingService {
    /// Create a new following service.
    #[must_use]
    pub const fn new(
        following_repo: FollowingRepository,
        user_repo: UserRepository,
        conversation_service: ConversationService,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            following_repo,
            user_repo,
            conversation_service,
            notification_service,
            id_gen: IdGenerator::new(),
        }
    }

    /// Follow `followee_id`, or unfollow if already following.
    pub async fn toggle(&self, follower_id: &str, followee_id: &str) -> AppResult<FollowOutcome> {
        if follower_id == followee_id {
            return Err(AppError::BadRequest("Cannot follow yourself".to_string()));
        }

        let followee = self
            .user_repo
            .find_by_id(followee_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User not found: {followee_id}")))?;

        if self.following_repo.remove(follower_id, followee_id).await? {
            tracing::info!(follower_id, followee_id, "Unfollowed");
            return Ok(FollowOutcome::default());
        }

        let model = following::ActiveModel {
            id: Set(self.id_gen.generate()),
            follower_id: Set(follower_id.to_string()),
            followee_id: Set(followee_id.to_string()),
            created_at: Set(Utc::now().into()),
        };
        self.following_repo.create(model).await?;
        tracing::info!(follower_id, followee_id, "Followed");

        let follower_name = self
            .user_repo
            .find_by_id(follower_id)
            .await?
            .map_or_else(|| follower_id.to_string(), |u| u.display_name().to_string());

        let mut outcome = FollowOutcome {
            following: true,
            ..Default::default()
        };

        match self
            .notification_service
            .create_follow_notification(
                followee_id,
                follower_id,
                format!("{follower_name} followed you"),
            )
            .await
        {
            Ok(n) => outcome.notifications.push(n),
            Err(e) => tracing::warn!(error = %e, "Failed to create follow notification"),
        }

        if self
            .following_repo
            .is_following(followee_id, follower_id)
            .await?
        {
            outcome.mutual = true;
            outcome.conversation = Some(
                self.conversation_service
                    .get_or_create(follower_id, followee_id)
                    .await?,
            );

            match self
                .notification_service
                .create_follow_notification(
                    follower_id,
                    followee_id,
                    format!("{} followed you back", followee.display_name()),
                )
                .await
            {
                Ok(n) => outcome.notifications.push(n),
                Err(e) => tracing::warn!(error = %e, "Failed to create follow-back notification"),
            }
        }

        Ok(outcome)
    }

    /// Whether `follower_id` follows `followee_id`.
    pub async fn is_following(&self, follower_id: &str, followee_id: &str) -> AppResult<bool> {
        self.following_repo
            .is_following(follower_id, followee_id)
            .await
    }
}
