//! Messaging service: message lifecycle and payload assembly.
//!
//! Both submission paths (socket and HTTP) go through
//! [`MessagingService::create_message`], so validation and persistence are
//! identical regardless of transport.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parley_common::{AppError, AppResult, AttachmentKind, IdGenerator, MediaStore};
use parley_db::{
    entities::{
        chat_message::{self, TOMBSTONE},
        conversation::{self, EMPTY_SUMMARY},
        id_list,
    },
    repositories::{ChatMessageRepository, ConversationRepository, UserRepository},
};
use sea_orm::Set;
use validator::Validate;

use super::events::{MessagePayload, ReplyPreview, UserSummary};

/// Most message IDs accepted by one mark-seen call.
pub const MAX_SEEN_BATCH: usize = 500;

/// Input for creating a message.
#[derive(Debug, Clone, Default, Validate)]
pub struct CreateMessageInput {
    #[validate(length(max = 4000, message = "Message content is too long"))]
    pub content: String,
    pub reply_to: Option<String>,
    pub attachment: Option<NewAttachment>,
}

/// Attachment metadata produced by the media collaborator.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub url: String,
    pub kind: AttachmentKind,
    pub thumbnail_url: Option<String>,
    /// Absent when the client uploaded the file itself.
    pub deletion_handle: Option<String>,
}

/// A message after an edit or delete, and whether the conversation summary
/// depended on it.
#[derive(Debug, Clone)]
pub struct MessageChange {
    pub message: chat_message::Model,
    pub summary_changed: bool,
}

/// Summary line for a conversation whose newest visible message is `message`.
#[must_use]
pub fn summary_text(message: &chat_message::Model) -> String {
    if !message.content.is_empty() {
        message.content.clone()
    } else if let Some(kind) = message.attachment_kind {
        AttachmentKind::from(kind).placeholder().to_string()
    } else {
        EMPTY_SUMMARY.to_string()
    }
}

/// Word describing `message` in notification text.
#[must_use]
pub fn notification_noun(message: &chat_message::Model) -> &'static str {
    message
        .attachment_kind
        .map_or("message", |k| AttachmentKind::from(k).as_str())
}

/// Messaging service.
#[derive(Clone)]
pub struct MessagingService {
    message_repo: ChatMessageRepository,
    conversation_repo: ConversationRepository,
    user_repo: UserRepository,
    media: Option<Arc<dyn MediaStore>>,
    id_gen: IdGenerator,
}

impl MessagingService {
    /// Create a new messaging service.
    #[must_use]
    pub const fn new(
        message_repo: ChatMessageRepository,
        conversation_repo: ConversationRepository,
        user_repo: UserRepository,
    ) -> Self {
        Self {
            message_repo,
            conversation_repo,
            user_repo,
            media: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the media store used to release attachments of deleted messages.
    pub fn set_media_store(&mut self, media: Arc<dyn MediaStore>) {
        self.media = Some(media);
    }

    /// Validate and persist a new message in `conversation`.
    ///
    /// Does not touch the conversation summary; see [`Self::record_new_message`].
    pub async fn create_message(
        &self,
        conversation: &conversation::Model,
        sender_id: &str,
        mut input: CreateMessageInput,
    ) -> AppResult<chat_message::Model> {
        if !conversation.is_participant(sender_id) {
            return Err(AppError::Forbidden(
                "Not a participant of this conversation".to_string(),
            ));
        }

        input.content = input.content.trim().to_string();
        input.validate()?;

        if input.content.is_empty() && input.attachment.is_none() {
            return Err(AppError::Validation(
                "Message must have content or an attachment".to_string(),
            ));
        }

        if let Some(ref reply_to) = input.reply_to {
            let target = self.message_repo.find_by_id(reply_to).await?;
            if target.is_none_or(|t| t.conversation_id != conversation.id) {
                return Err(AppError::Validation(
                    "Reply target is not in this conversation".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let (attachment_url, attachment_kind, thumbnail_url, deletion_handle) =
            match input.attachment {
                Some(a) => (
                    Some(a.url),
                    Some(chat_message::AttachmentKind::from(a.kind)),
                    a.thumbnail_url,
                    a.deletion_handle,
                ),
                None => (None, None, None, None),
            };

        let model = chat_message::ActiveModel {
            id: Set(self.id_gen.generate()),
            conversation_id: Set(conversation.id.clone()),
            sender_id: Set(sender_id.to_string()),
            content: Set(input.content),
            attachment_url: Set(attachment_url),
            attachment_kind: Set(attachment_kind),
            thumbnail_url: Set(thumbnail_url),
            deletion_handle: Set(deletion_handle),
            seen_by: Set(id_list::single(sender_id)),
            is_edited: Set(false),
            is_deleted: Set(false),
            reply_to_id: Set(input.reply_to),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let message = self.message_repo.create(model).await?;
        tracing::debug!(message_id = %message.id, conversation_id = %conversation.id, "Message stored");
        Ok(message)
    }

    /// Point the summary at a freshly stored message and bump the recipient's unread counter.
    pub async fn record_new_message(
        &self,
        conversation: &conversation::Model,
        message: &chat_message::Model,
    ) -> AppResult<()> {
        self.write_summary(&conversation.id, Some(message)).await?;

        if let Some(recipient) = conversation.partner_of(&message.sender_id) {
            self.conversation_repo
                .increment_unread(conversation, recipient)
                .await?;
        }
        Ok(())
    }

    /// Recompute the summary from the newest non-deleted message.
    ///
    /// Returns the conversation as stored afterwards.
    pub async fn refresh_summary(&self, conversation_id: &str) -> AppResult<conversation::Model> {
        let latest = self.message_repo.find_latest_visible(conversation_id).await?;
        self.write_summary(conversation_id, latest.as_ref()).await?;

        self.conversation_repo
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conversation not found: {conversation_id}")))
    }

    /// The single writer of the denormalized summary: `latest` is the newest
    /// visible message, or `None` when nothing visible remains.
    async fn write_summary(
        &self,
        conversation_id: &str,
        latest: Option<&chat_message::Model>,
    ) -> AppResult<()> {
        match latest {
            Some(m) => {
                self.conversation_repo
                    .update_summary(conversation_id, &summary_text(m), Some(m.created_at))
                    .await
            }
            None => {
                self.conversation_repo
                    .update_summary(conversation_id, EMPTY_SUMMARY, None)
                    .await
            }
        }
    }

    /// Replace the text of a message. Only the sender may edit, and only text messages.
    pub async fn edit_message(
        &self,
        user_id: &str,
        message_id: &str,
        content: &str,
    ) -> AppResult<MessageChange> {
        let message = self.find_own_message(user_id, message_id, "edit").await?;

        if message.is_deleted {
            return Err(AppError::Validation(
                "Deleted messages cannot be edited".to_string(),
            ));
        }
        if message.has_attachment() {
            return Err(AppError::Validation(
                "Messages with attachments cannot be edited".to_string(),
            ));
        }

        let input = CreateMessageInput {
            content: content.trim().to_string(),
            ..Default::default()
        };
        input.validate()?;
        if input.content.is_empty() {
            return Err(AppError::Validation(
                "Message content cannot be empty".to_string(),
            ));
        }

        let summary_changed = self.is_latest_visible(&message).await?;

        let mut active: chat_message::ActiveModel = message.into();
        active.content = Set(input.content);
        active.is_edited = Set(true);
        active.updated_at = Set(Utc::now().into());

        let message = self.message_repo.update(active).await?;
        Ok(MessageChange {
            message,
            summary_changed,
        })
    }

    /// Tombstone a message. Deleting twice returns the tombstone unchanged.
    pub async fn delete_message(&self, user_id: &str, message_id: &str) -> AppResult<MessageChange> {
        let message = self.find_own_message(user_id, message_id, "delete").await?;

        if message.is_deleted {
            return Ok(MessageChange {
                message,
                summary_changed: false,
            });
        }

        let summary_changed = self.is_latest_visible(&message).await?;
        let handle = message.deletion_handle.clone();

        let mut active: chat_message::ActiveModel = message.into();
        active.content = Set(TOMBSTONE.to_string());
        active.attachment_url = Set(None);
        active.attachment_kind = Set(None);
        active.thumbnail_url = Set(None);
        active.deletion_handle = Set(None);
        active.is_deleted = Set(true);
        active.updated_at = Set(Utc::now().into());

        let message = self.message_repo.update(active).await?;

        // Released only once the tombstone is stored; failure is logged.
        if let (Some(handle), Some(media)) = (handle.as_deref(), &self.media) {
            if let Err(e) = media.delete(handle).await {
                tracing::warn!(error = %e, message_id = %message.id, "Failed to release attachment");
            }
        }

        Ok(MessageChange {
            message,
            summary_changed,
        })
    }

    /// Add `user_id` to `seen_by` of the listed messages and clear their unread counter.
    ///
    /// Returns the listed IDs that belong to the conversation and weren't sent by `user_id`.
    pub async fn mark_seen(
        &self,
        conversation: &conversation::Model,
        user_id: &str,
        message_ids: &[String],
    ) -> AppResult<Vec<String>> {
        if !conversation.is_participant(user_id) {
            return Err(AppError::Forbidden(
                "Not a participant of this conversation".to_string(),
            ));
        }
        if message_ids.len() > MAX_SEEN_BATCH {
            return Err(AppError::Validation(format!(
                "At most {MAX_SEEN_BATCH} messages can be marked at once"
            )));
        }

        let seen = self
            .message_repo
            .mark_seen(&conversation.id, user_id, message_ids)
            .await?;
        self.conversation_repo
            .reset_unread(conversation, user_id)
            .await?;
        Ok(seen)
    }

    /// Load a message by ID.
    pub async fn get_message(&self, message_id: &str) -> AppResult<chat_message::Model> {
        self.message_repo
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Message not found: {message_id}")))
    }

    /// IDs of messages `user_id` received in a conversation but hasn't seen.
    pub async fn unseen_ids(&self, conversation_id: &str, user_id: &str) -> AppResult<Vec<String>> {
        self.message_repo
            .find_unseen_ids(conversation_id, user_id)
            .await
    }

    /// A page of messages as payloads, oldest first.
    pub async fn list_messages(
        &self,
        conversation_id: &str,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<MessagePayload>> {
        let messages = self
            .message_repo
            .find_in_conversation(conversation_id, limit, until_id)
            .await?;
        self.build_payloads(&messages).await
    }

    /// Build the client payload of one message, echoing `temp_id`.
    pub async fn build_payload(
        &self,
        message: &chat_message::Model,
        temp_id: Option<String>,
    ) -> AppResult<MessagePayload> {
        let mut payloads = self.build_payloads(std::slice::from_ref(message)).await?;
        let mut payload = payloads
            .pop()
            .ok_or_else(|| AppError::Internal("Payload batch came back empty".to_string()))?;
        payload.temp_id = temp_id;
        Ok(payload)
    }

    /// Build payloads for a batch, resolving senders and reply targets in bulk.
    pub async fn build_payloads(
        &self,
        messages: &[chat_message::Model],
    ) -> AppResult<Vec<MessagePayload>> {
        let reply_ids: Vec<String> = messages
            .iter()
            .filter_map(|m| m.reply_to_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let replies: HashMap<String, chat_message::Model> = self
            .message_repo
            .find_by_ids(&reply_ids)
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let user_ids: Vec<String> = messages
            .iter()
            .chain(replies.values())
            .map(|m| m.sender_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let users: HashMap<String, _> = self
            .user_repo
            .find_by_ids(&user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let payloads = messages
            .iter()
            .map(|m| {
                let reply_to = m
                    .reply_to_id
                    .as_ref()
                    .and_then(|id| replies.get(id))
                    .map(|target| {
                        ReplyPreview::new(
                            target,
                            UserSummary::resolve(&target.sender_id, users.get(&target.sender_id)),
                        )
                    });
                MessagePayload::new(
                    m,
                    UserSummary::resolve(&m.sender_id, users.get(&m.sender_id)),
                    reply_to,
                    None,
                )
            })
            .collect();

        Ok(payloads)
    }

    async fn find_own_message(
        &self,
        user_id: &str,
        message_id: &str,
        action: &str,
    ) -> AppResult<chat_message::Model> {
        let message = self
            .message_repo
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Message not found: {message_id}")))?;

        if message.sender_id != user_id {
            return Err(AppError::Forbidden(format!(
                "Only the sender can {action} this message"
            )));
        }
        Ok(message)
    }

    async fn is_latest_visible(&self, message: &chat_message::Model) -> AppResult<bool> {
        let latest = self
            .message_repo
            .find_latest_visible(&message.conversation_id)
            .await?;
        Ok(latest.is_some_and(|m| m.id == message.id))
    }
}
