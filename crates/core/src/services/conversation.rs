//! Conversation service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parley_common::{AppError, AppResult, IdGenerator};
use parley_db::{
    entities::{conversation, id_list, user},
    repositories::{ConversationRepository, UserRepository},
};
use sea_orm::Set;
use serde::Serialize;

use super::events::UserSummary;

/// One row of a user's conversation list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListItem {
    pub id: String,
    pub partner: UserSummary,
    pub last_message: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i32,
    pub created_at: DateTime<Utc>,
}

fn list_item(
    c: &conversation::Model,
    user_id: &str,
    partner_id: &str,
    partner: Option<&user::Model>,
) -> ConversationListItem {
    ConversationListItem {
        id: c.id.clone(),
        partner: UserSummary::resolve(partner_id, partner),
        last_message: c.last_message.clone(),
        last_message_at: c.last_message_at.map(|t| t.with_timezone(&Utc)),
        unread_count: c.unread_for(user_id),
        created_at: c.created_at.with_timezone(&Utc),
    }
}

/// Result of a get-or-create.
#[derive(Debug, Clone)]
pub struct OpenedConversation {
    pub conversation: conversation::Model,
    pub created: bool,
}

/// Conversation service.
#[derive(Clone)]
pub struct ConversationService {
    conversation_repo: ConversationRepository,
    user_repo: UserRepository,
    id_gen: IdGenerator,
}

impl ConversationService {
    /// Create a new conversation service.
    #[must_use]
    pub const fn new(conversation_repo: ConversationRepository, user_repo: UserRepository) -> Self {
        Self {
            conversation_repo,
            user_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// The conversation between `user_id` and `partner_id`, created if missing.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        partner_id: &str,
    ) -> AppResult<OpenedConversation> {
        if user_id == partner_id {
            return Err(AppError::BadRequest(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        if let Some(conversation) = self.conversation_repo.find_between(user_id, partner_id).await? {
            return Ok(OpenedConversation {
                conversation,
                created: false,
            });
        }

        self.user_repo
            .find_by_id(partner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User not found: {partner_id}")))?;

        let model = conversation::ActiveModel {
            id: Set(self.id_gen.generate()),
            user1_id: Set(user_id.to_string()),
            user2_id: Set(partner_id.to_string()),
            deleted_by: Set(id_list::empty()),
            last_message: Set(conversation::EMPTY_SUMMARY.to_string()),
            last_message_at: Set(None),
            user1_unread: Set(0),
            user2_unread: Set(0),
            created_at: Set(Utc::now().into()),
        };

        match self.conversation_repo.create(model).await {
            Ok(conversation) => {
                tracing::info!(conversation_id = %conversation.id, user_id, partner_id, "Conversation created");
                Ok(OpenedConversation {
                    conversation,
                    created: true,
                })
            }
            Err(e) => {
                // Lost a race with the other participant; the pair index kept one row.
                let conversation = self
                    .conversation_repo
                    .find_between(user_id, partner_id)
                    .await?
                    .ok_or(e)?;
                Ok(OpenedConversation {
                    conversation,
                    created: false,
                })
            }
        }
    }

    /// Load a conversation the caller participates in.
    pub async fn get_for_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<conversation::Model> {
        let conversation = self
            .conversation_repo
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {conversation_id}")))?;

        if !conversation.is_participant(user_id) {
            return Err(AppError::Forbidden(
                "Not a participant of this conversation".to_string(),
            ));
        }
        Ok(conversation)
    }

    /// Load a conversation by ID.
    pub async fn get(&self, conversation_id: &str) -> AppResult<conversation::Model> {
        self.conversation_repo
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {conversation_id}")))
    }

    /// Every conversation the user is in, soft-deleted ones included.
    pub async fn participant_conversations(
        &self,
        user_id: &str,
    ) -> AppResult<Vec<conversation::Model>> {
        self.conversation_repo.find_by_participant(user_id).await
    }

    /// The user's conversation list, newest activity first.
    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<ConversationListItem>> {
        let conversations = self.conversation_repo.find_visible_for_user(user_id).await?;

        let partner_ids: Vec<String> = conversations
            .iter()
            .filter_map(|c| c.partner_of(user_id).map(ToString::to_string))
            .collect();
        let partners: HashMap<String, _> = self
            .user_repo
            .find_by_ids(&partner_ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let items = conversations
            .iter()
            .filter_map(|c| {
                let partner_id = c.partner_of(user_id)?;
                Some(list_item(c, user_id, partner_id, partners.get(partner_id)))
            })
            .collect();

        Ok(items)
    }

    /// One conversation as it appears in `user_id`'s list.
    pub async fn list_item_for(
        &self,
        conversation: &conversation::Model,
        user_id: &str,
    ) -> AppResult<ConversationListItem> {
        let partner_id = conversation.partner_of(user_id).ok_or_else(|| {
            AppError::Forbidden("Not a participant of this conversation".to_string())
        })?;
        let partner = self.user_repo.find_by_id(partner_id).await?;
        Ok(list_item(conversation, user_id, partner_id, partner.as_ref()))
    }

    /// Hide a conversation from the caller's list. The partner keeps it.
    pub async fn soft_delete(&self, conversation_id: &str, user_id: &str) -> AppResult<bool> {
        let conversation = self.get_for_participant(conversation_id, user_id).await?;
        let changed = self
            .conversation_repo
            .mark_deleted_for(&conversation.id, user_id)
            .await?;

        if changed {
            tracing::info!(conversation_id, user_id, "Conversation hidden for user");
        }
        Ok(changed)
    }
}
