//! Chat coordinator: the socket protocol on top of the services.
//!
//! Every operation returns `AppResult`; [`ChatCoordinator::handle`] turns a
//! failure into `message_error` (for sends) or `error` (everything else) on
//! the calling connection only.

use std::sync::Arc;

use parley_common::{AppError, AppResult};
use parley_db::entities::{chat_message, conversation, notification};
use tokio::sync::mpsc::UnboundedReceiver;

use super::conversation::ConversationService;
use super::events::{
    ChatUpdatedPayload, ClientEvent, MessagePayload, NotificationPayload, SendMessageData,
    ServerEvent,
};
use super::hub::{ConnectionId, RoomHub};
use super::messaging::{CreateMessageInput, MessagingService, NewAttachment, notification_noun};
use super::notification::NotificationService;
use super::presence::PresenceRegistry;

/// One admitted socket connection and the user its token was issued for.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// Hub connection the socket drains.
    pub id: ConnectionId,
    /// User the admission token was issued for.
    pub user_id: String,
}

/// Drives the real-time protocol and the fan-out of HTTP-originated changes.
#[derive(Clone)]
pub struct ChatCoordinator {
    hub: RoomHub,
    presence: Arc<dyn PresenceRegistry>,
    messaging: MessagingService,
    conversations: ConversationService,
    notifications: NotificationService,
}

impl ChatCoordinator {
    /// Create a new coordinator.
    #[must_use]
    pub fn new(
        hub: RoomHub,
        presence: Arc<dyn PresenceRegistry>,
        messaging: MessagingService,
        conversations: ConversationService,
        notifications: NotificationService,
    ) -> Self {
        Self {
            hub,
            presence,
            messaging,
            conversations,
            notifications,
        }
    }

    /// The room hub this coordinator fans out through.
    #[must_use]
    pub const fn hub(&self) -> &RoomHub {
        &self.hub
    }

    /// Open a hub connection for an admitted user.
    pub async fn connect(
        &self,
        user_id: &str,
    ) -> (ConnectionContext, UnboundedReceiver<ServerEvent>) {
        let (id, rx) = self.hub.connect().await;
        tracing::info!(user_id, connection = %id, "Socket connected");
        (
            ConnectionContext {
                id,
                user_id: user_id.to_string(),
            },
            rx,
        )
    }

    /// Tear down a connection: presence first, then rooms.
    pub async fn disconnect(&self, ctx: &ConnectionContext) {
        self.presence.remove(ctx.id).await;
        self.hub.disconnect(ctx.id).await;
        tracing::info!(user_id = %ctx.user_id, connection = %ctx.id, "Socket disconnected");
    }

    /// Dispatch one inbound event.
    pub async fn handle(&self, ctx: &ConnectionContext, event: ClientEvent) {
        let result = match event {
            ClientEvent::Register { user_id } => self.register(ctx, &user_id).await,
            ClientEvent::JoinChat { conversation_id } => self.join_chat(ctx, &conversation_id).await,
            ClientEvent::Typing {
                conversation_id,
                user_id,
            } => self.typing(ctx, &conversation_id, &user_id).await,
            ClientEvent::SendMessage(data) => {
                let temp_id = data.temp_id.clone();
                if let Err(e) = self.send_message(ctx, data).await {
                    tracing::debug!(error = %e, user_id = %ctx.user_id, "Send rejected");
                    self.hub
                        .emit_to(
                            ctx.id,
                            ServerEvent::MessageError {
                                temp_id,
                                error: e.to_string(),
                            },
                        )
                        .await;
                }
                return;
            }
            ClientEvent::EditMessage {
                message_id,
                content,
            } => self
                .edit_message(&ctx.user_id, &message_id, &content)
                .await
                .map(|_| ()),
            ClientEvent::DeleteMessage { message_id } => self
                .delete_message(&ctx.user_id, &message_id)
                .await
                .map(|_| ()),
            ClientEvent::MarkMessagesSeen {
                conversation_id,
                message_ids,
            } => {
                self.mark_messages_seen(&ctx.user_id, &conversation_id, &message_ids)
                    .await
            }
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, user_id = %ctx.user_id, "Socket event rejected");
            self.hub
                .emit_to(ctx.id, ServerEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
    }

    /// Bind the connection to its user and join every conversation room.
    pub async fn register(&self, ctx: &ConnectionContext, user_id: &str) -> AppResult<()> {
        if user_id != ctx.user_id {
            return Err(AppError::Forbidden(
                "Cannot register as another user".to_string(),
            ));
        }

        self.presence.register(user_id, ctx.id).await;

        let conversations = self.conversations.participant_conversations(user_id).await?;
        for c in &conversations {
            self.hub.join(ctx.id, &c.id).await;
        }

        tracing::debug!(user_id, rooms = conversations.len(), "User registered");
        Ok(())
    }

    /// Join one conversation room and report what the caller hasn't seen.
    pub async fn join_chat(&self, ctx: &ConnectionContext, conversation_id: &str) -> AppResult<()> {
        let conversation = self
            .conversations
            .get_for_participant(conversation_id, &ctx.user_id)
            .await?;

        self.hub.join(ctx.id, &conversation.id).await;

        let message_ids = self
            .messaging
            .unseen_ids(&conversation.id, &ctx.user_id)
            .await?;
        self.hub
            .emit_to(
                ctx.id,
                ServerEvent::UnseenMessages {
                    conversation_id: conversation.id,
                    message_ids,
                },
            )
            .await;
        Ok(())
    }

    /// Relay a typing indicator. Nothing is stored.
    pub async fn typing(
        &self,
        ctx: &ConnectionContext,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<()> {
        if user_id != ctx.user_id {
            return Err(AppError::Forbidden(
                "Cannot send typing for another user".to_string(),
            ));
        }
        if !self.hub.is_member(ctx.id, conversation_id).await {
            return Err(AppError::Forbidden(
                "Join the conversation first".to_string(),
            ));
        }

        self.hub
            .emit_to_room(
                conversation_id,
                &ServerEvent::Typing {
                    conversation_id: conversation_id.to_string(),
                    user_id: user_id.to_string(),
                },
            )
            .await;
        Ok(())
    }

    /// Real-time send.
    pub async fn send_message(
        &self,
        ctx: &ConnectionContext,
        data: SendMessageData,
    ) -> AppResult<MessagePayload> {
        if data.sender_id != ctx.user_id {
            return Err(AppError::Forbidden(
                "Sender does not match the connection".to_string(),
            ));
        }

        let conversation = self
            .conversations
            .get_for_participant(&data.conversation_id, &ctx.user_id)
            .await?;

        let input = CreateMessageInput {
            content: data.content,
            reply_to: data.reply_to,
            attachment: data.attachment.map(|a| NewAttachment {
                url: a.url,
                kind: a.kind,
                thumbnail_url: a.thumbnail_url,
                deletion_handle: None,
            }),
        };

        self.submit(&conversation, &ctx.user_id, input, data.temp_id, Some(ctx.id))
            .await
    }

    /// Persist a message and publish it. Shared by the socket and HTTP paths.
    ///
    /// `origin` is the connection that should receive a `message_error` if
    /// the summary update fails; HTTP callers pass `None` and the sender's
    /// present connection is used.
    pub async fn submit(
        &self,
        conversation: &conversation::Model,
        sender_id: &str,
        input: CreateMessageInput,
        temp_id: Option<String>,
        origin: Option<ConnectionId>,
    ) -> AppResult<MessagePayload> {
        let message = self
            .messaging
            .create_message(conversation, sender_id, input)
            .await?;
        self.publish_new_message(conversation, &message, temp_id, origin)
            .await
    }

    /// Update the summary and unread counter of a stored message, then fan it out.
    pub async fn publish_new_message(
        &self,
        conversation: &conversation::Model,
        message: &chat_message::Model,
        temp_id: Option<String>,
        origin: Option<ConnectionId>,
    ) -> AppResult<MessagePayload> {
        let recorded = self.messaging.record_new_message(conversation, message).await;

        let payload = self.messaging.build_payload(message, temp_id.clone()).await?;
        self.hub
            .emit_to_room(
                &conversation.id,
                &ServerEvent::ReceiveMessage(payload.clone()),
            )
            .await;

        match recorded {
            Ok(()) => self.announce_conversation(&conversation.id).await,
            Err(e) => {
                tracing::error!(error = %e, message_id = %message.id, "Message stored but summary update failed");
                let target = match origin {
                    Some(id) => Some(id),
                    None => self.presence.lookup(&message.sender_id).await,
                };
                if let Some(id) = target {
                    self.hub
                        .emit_to(
                            id,
                            ServerEvent::MessageError {
                                temp_id,
                                error: e.to_string(),
                            },
                        )
                        .await;
                }
            }
        }

        if let Some(recipient) = conversation.partner_of(&message.sender_id) {
            match self
                .notifications
                .create_new_message_notification(
                    recipient,
                    &payload.sender.name,
                    notification_noun(message),
                    &conversation.id,
                )
                .await
            {
                Ok(n) => self.push_notification(&n).await,
                Err(e) => tracing::warn!(error = %e, "Failed to create message notification"),
            }
        }

        Ok(payload)
    }

    /// Edit a message and fan out the change.
    pub async fn edit_message(
        &self,
        user_id: &str,
        message_id: &str,
        content: &str,
    ) -> AppResult<MessagePayload> {
        let change = self
            .messaging
            .edit_message(user_id, message_id, content)
            .await?;
        let payload = self.messaging.build_payload(&change.message, None).await?;

        self.hub
            .emit_to_room(
                &change.message.conversation_id,
                &ServerEvent::MessageUpdated(payload.clone()),
            )
            .await;

        if change.summary_changed {
            self.refresh_and_announce(&change.message.conversation_id)
                .await?;
        }
        Ok(payload)
    }

    /// Delete a message and fan out the tombstone.
    pub async fn delete_message(&self, user_id: &str, message_id: &str) -> AppResult<MessagePayload> {
        let change = self.messaging.delete_message(user_id, message_id).await?;
        let payload = self.messaging.build_payload(&change.message, None).await?;

        self.hub
            .emit_to_room(
                &change.message.conversation_id,
                &ServerEvent::MessageDeleted(payload.clone()),
            )
            .await;

        if change.summary_changed {
            self.refresh_and_announce(&change.message.conversation_id)
                .await?;
        }
        Ok(payload)
    }

    /// Record that `user_id` saw the listed messages.
    ///
    /// The `messages_seen` echo carries only the IDs that were eligible: in
    /// this conversation and sent by the other participant.
    pub async fn mark_messages_seen(
        &self,
        user_id: &str,
        conversation_id: &str,
        message_ids: &[String],
    ) -> AppResult<()> {
        let conversation = self
            .conversations
            .get_for_participant(conversation_id, user_id)
            .await?;

        let seen = self
            .messaging
            .mark_seen(&conversation, user_id, message_ids)
            .await?;

        self.hub
            .emit_to_room(
                &conversation.id,
                &ServerEvent::MessagesSeen {
                    conversation_id: conversation.id.clone(),
                    message_ids: seen,
                    user_id: user_id.to_string(),
                },
            )
            .await;
        self.announce_conversation(&conversation.id).await;
        Ok(())
    }

    /// Hide a conversation for `user_id` and tell their live connection.
    pub async fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> AppResult<()> {
        self.conversations
            .soft_delete(conversation_id, user_id)
            .await?;

        if let Some(id) = self.presence.lookup(user_id).await {
            self.hub
                .emit_to(
                    id,
                    ServerEvent::ChatDeleted {
                        conversation_id: conversation_id.to_string(),
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Join present participants to the room of a newly opened conversation.
    pub async fn conversation_opened(&self, conversation: &conversation::Model) {
        for user_id in [&conversation.user1_id, &conversation.user2_id] {
            if let Some(id) = self.presence.lookup(user_id).await {
                self.hub.join(id, &conversation.id).await;
            }
        }
    }

    /// Push a stored notification to its recipient if they are online.
    pub async fn push_notification(&self, notification: &notification::Model) {
        let Some(id) = self.presence.lookup(&notification.user_id).await else {
            return;
        };

        if !self
            .hub
            .emit_to(
                id,
                ServerEvent::ReceiveNotification(NotificationPayload::from(notification)),
            )
            .await
        {
            tracing::warn!(user_id = %notification.user_id, "Notification push failed: connection gone");
        }
    }

    async fn refresh_and_announce(&self, conversation_id: &str) -> AppResult<()> {
        let conversation = self.messaging.refresh_summary(conversation_id).await?;
        self.hub
            .emit_to_room(
                conversation_id,
                &ServerEvent::ChatUpdated(ChatUpdatedPayload::from(&conversation)),
            )
            .await;
        Ok(())
    }

    async fn announce_conversation(&self, conversation_id: &str) {
        match self.conversations.get(conversation_id).await {
            Ok(conversation) => {
                self.hub
                    .emit_to_room(
                        conversation_id,
                        &ServerEvent::ChatUpdated(ChatUpdatedPayload::from(&conversation)),
                    )
                    .await;
            }
            Err(e) => tracing::warn!(error = %e, conversation_id, "Failed to reload conversation"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::messaging::tests::{
        create_test_conversation, create_test_message, create_test_user, exec_ok,
    };
    use crate::services::presence::InMemoryPresence;
    use parley_db::entities::conversation::EMPTY_SUMMARY;
    use parley_db::repositories::{
        ChatMessageRepository, ConversationRepository, NotificationRepository, UserRepository,
    };
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, Value};
    use std::collections::BTreeMap;

    fn empty_db() -> Arc<DatabaseConnection> {
        Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection())
    }

    struct Dbs {
        messages: Arc<DatabaseConnection>,
        conversations: Arc<DatabaseConnection>,
        users: Arc<DatabaseConnection>,
        notifications: Arc<DatabaseConnection>,
    }

    impl Default for Dbs {
        fn default() -> Self {
            Self {
                messages: empty_db(),
                conversations: empty_db(),
                users: empty_db(),
                notifications: empty_db(),
            }
        }
    }

    fn coordinator(dbs: Dbs) -> (ChatCoordinator, Arc<InMemoryPresence>) {
        let presence = Arc::new(InMemoryPresence::new());
        let conversation_repo = ConversationRepository::new(dbs.conversations);
        let user_repo = UserRepository::new(dbs.users);

        let coordinator = ChatCoordinator::new(
            RoomHub::new(),
            presence.clone(),
            MessagingService::new(
                ChatMessageRepository::new(dbs.messages),
                conversation_repo.clone(),
                user_repo.clone(),
            ),
            ConversationService::new(conversation_repo, user_repo),
            NotificationService::new(NotificationRepository::new(dbs.notifications)),
        );
        (coordinator, presence)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    fn names(events: &[ServerEvent]) -> Vec<&'static str> {
        events.iter().map(ServerEvent::name).collect()
    }

    fn send(conversation_id: &str, sender_id: &str, content: &str, temp_id: &str) -> ClientEvent {
        ClientEvent::SendMessage(SendMessageData {
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            temp_id: Some(temp_id.to_string()),
            reply_to: None,
            attachment: None,
        })
    }

    #[tokio::test]
    async fn test_register_with_foreign_user_id() {
        let (coordinator, presence) = coordinator(Dbs::default());
        let (ctx, mut rx) = coordinator.connect("alice").await;

        coordinator
            .handle(&ctx, ClientEvent::Register {
                user_id: "bob".to_string(),
            })
            .await;

        assert_eq!(names(&drain(&mut rx)), ["error"]);
        assert_eq!(presence.lookup("bob").await, None);
        assert_eq!(presence.lookup("alice").await, None);
    }

    #[tokio::test]
    async fn test_register_joins_all_rooms() {
        let conversations = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    create_test_conversation("c1", "alice", "bob"),
                    create_test_conversation("c2", "carol", "alice"),
                ]])
                .into_connection(),
        );
        let (coordinator, presence) = coordinator(Dbs {
            conversations,
            ..Default::default()
        });
        let (ctx, _rx) = coordinator.connect("alice").await;

        coordinator.register(&ctx, "alice").await.unwrap();

        assert_eq!(presence.lookup("alice").await, Some(ctx.id));
        assert_eq!(coordinator.hub().room_size("c1").await, 1);
        assert_eq!(coordinator.hub().room_size("c2").await, 1);
    }

    #[tokio::test]
    async fn test_join_chat_twice_is_one_membership() {
        let conv = create_test_conversation("c1", "alice", "bob");
        let conversations = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[conv.clone()], [conv]])
                .into_connection(),
        );
        let unseen: Vec<BTreeMap<&str, Value>> =
            vec![BTreeMap::from([("id", Value::from("m1"))])];
        let messages = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([unseen.clone(), unseen])
                .into_connection(),
        );
        let (coordinator, _) = coordinator(Dbs {
            conversations,
            messages,
            ..Default::default()
        });
        let (ctx, mut rx) = coordinator.connect("bob").await;

        coordinator.join_chat(&ctx, "c1").await.unwrap();
        coordinator.join_chat(&ctx, "c1").await.unwrap();

        assert_eq!(coordinator.hub().room_size("c1").await, 1);
        let events = drain(&mut rx);
        assert_eq!(names(&events), ["unseen_messages", "unseen_messages"]);
        let ServerEvent::UnseenMessages { message_ids, .. } = &events[0] else {
            panic!("expected unseen_messages");
        };
        assert_eq!(message_ids, &["m1".to_string()]);
    }

    #[tokio::test]
    async fn test_join_chat_as_outsider() {
        let conversations = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
                .into_connection(),
        );
        let (coordinator, _) = coordinator(Dbs {
            conversations,
            ..Default::default()
        });
        let (ctx, mut rx) = coordinator.connect("mallory").await;

        coordinator
            .handle(&ctx, ClientEvent::JoinChat {
                conversation_id: "c1".to_string(),
            })
            .await;

        assert_eq!(names(&drain(&mut rx)), ["error"]);
        assert_eq!(coordinator.hub().room_size("c1").await, 0);
    }

    #[tokio::test]
    async fn test_send_reaches_both_participants() {
        let conv = create_test_conversation("c1", "alice", "bob");
        let mut updated = conv.clone();
        updated.last_message = "hi".to_string();
        updated.user2_unread = 1;

        let conversations = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[conv.clone()], [conv.clone()], [conv]])
                .append_exec_results([exec_ok(), exec_ok()])
                .append_query_results([[updated]])
                .into_connection(),
        );
        let messages = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_message("m1", "alice", "hi")]])
                .into_connection(),
        );
        let users = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_user("alice", "Alice")]])
                .into_connection(),
        );
        let notifications = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[notification::Model {
                    id: "n1".to_string(),
                    user_id: "bob".to_string(),
                    kind: notification::NotificationKind::NewMessage,
                    message: "New message from Alice".to_string(),
                    related_id: "c1".to_string(),
                    is_read: false,
                    created_at: chrono::Utc::now().into(),
                }]])
                .into_connection(),
        );
        let (coordinator, _) = coordinator(Dbs {
            messages,
            conversations,
            users,
            notifications,
        });

        let (a, mut rx_a) = coordinator.connect("alice").await;
        let (b, mut rx_b) = coordinator.connect("bob").await;
        coordinator.register(&a, "alice").await.unwrap();
        coordinator.register(&b, "bob").await.unwrap();

        coordinator.handle(&a, send("c1", "alice", "hi", "t1")).await;

        let to_a = drain(&mut rx_a);
        assert_eq!(names(&to_a), ["receive_message", "chat_updated"]);
        let ServerEvent::ReceiveMessage(payload) = &to_a[0] else {
            panic!("expected receive_message");
        };
        assert_eq!(payload.temp_id.as_deref(), Some("t1"));
        assert_eq!(payload.sender.name, "Alice");
        assert_eq!(payload.seen_by, ["alice"]);

        let to_b = drain(&mut rx_b);
        assert_eq!(
            names(&to_b),
            ["receive_message", "chat_updated", "receive_notification"]
        );
        let ServerEvent::ChatUpdated(summary) = &to_b[1] else {
            panic!("expected chat_updated");
        };
        assert_eq!(summary.last_message, "hi");
        assert_eq!(summary.unread_counts["bob"], 1);
    }

    #[tokio::test]
    async fn test_send_as_someone_else() {
        let (coordinator, _) = coordinator(Dbs::default());
        let (ctx, mut rx) = coordinator.connect("alice").await;

        coordinator.handle(&ctx, send("c1", "bob", "hi", "t9")).await;

        let events = drain(&mut rx);
        let [ServerEvent::MessageError { temp_id, .. }] = events.as_slice() else {
            panic!("expected a single message_error");
        };
        assert_eq!(temp_id.as_deref(), Some("t9"));
    }

    #[tokio::test]
    async fn test_send_empty_message_reports_temp_id() {
        let conversations = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
                .into_connection(),
        );
        let (coordinator, _) = coordinator(Dbs {
            conversations,
            ..Default::default()
        });
        let (ctx, mut rx) = coordinator.connect("alice").await;

        coordinator.handle(&ctx, send("c1", "alice", "  ", "t2")).await;

        let events = drain(&mut rx);
        let [ServerEvent::MessageError { temp_id, error }] = events.as_slice() else {
            panic!("expected a single message_error");
        };
        assert_eq!(temp_id.as_deref(), Some("t2"));
        assert!(error.contains("content or an attachment"));
    }

    #[tokio::test]
    async fn test_summary_failure_still_delivers_message() {
        let conv = create_test_conversation("c1", "alice", "bob");
        // No exec results: the summary update fails after the insert.
        let conversations = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[conv]])
                .into_connection(),
        );
        let messages = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_message("m1", "alice", "hi")]])
                .into_connection(),
        );
        let users = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_user("alice", "Alice")]])
                .into_connection(),
        );
        let (coordinator, _) = coordinator(Dbs {
            messages,
            conversations,
            users,
            ..Default::default()
        });
        let (ctx, mut rx) = coordinator.connect("alice").await;
        coordinator.hub().join(ctx.id, "c1").await;

        coordinator.handle(&ctx, send("c1", "alice", "hi", "t3")).await;

        let events = drain(&mut rx);
        assert_eq!(names(&events), ["receive_message", "message_error"]);
        let ServerEvent::MessageError { temp_id, .. } = &events[1] else {
            panic!("expected message_error");
        };
        assert_eq!(temp_id.as_deref(), Some("t3"));
    }

    #[tokio::test]
    async fn test_typing_is_relayed() {
        let (coordinator, _) = coordinator(Dbs::default());
        let (a, mut rx_a) = coordinator.connect("alice").await;
        let (b, mut rx_b) = coordinator.connect("bob").await;
        coordinator.hub().join(a.id, "c1").await;
        coordinator.hub().join(b.id, "c1").await;

        coordinator
            .handle(&a, ClientEvent::Typing {
                conversation_id: "c1".to_string(),
                user_id: "alice".to_string(),
            })
            .await;

        assert_eq!(names(&drain(&mut rx_b)), ["typing"]);
        assert_eq!(names(&drain(&mut rx_a)), ["typing"]);
    }

    #[tokio::test]
    async fn test_typing_as_someone_else() {
        let (coordinator, _) = coordinator(Dbs::default());
        let (a, mut rx_a) = coordinator.connect("alice").await;
        let (b, mut rx_b) = coordinator.connect("bob").await;
        coordinator.hub().join(a.id, "c1").await;
        coordinator.hub().join(b.id, "c1").await;

        coordinator
            .handle(&a, ClientEvent::Typing {
                conversation_id: "c1".to_string(),
                user_id: "bob".to_string(),
            })
            .await;

        assert_eq!(names(&drain(&mut rx_a)), ["error"]);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_edit_by_non_sender_emits_error_only() {
        let messages = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_message("m1", "alice", "hi")]])
                .into_connection(),
        );
        let (coordinator, _) = coordinator(Dbs {
            messages,
            ..Default::default()
        });
        let (a, mut rx_a) = coordinator.connect("alice").await;
        let (b, mut rx_b) = coordinator.connect("bob").await;
        coordinator.hub().join(a.id, "c1").await;
        coordinator.hub().join(b.id, "c1").await;

        coordinator
            .handle(&b, ClientEvent::EditMessage {
                message_id: "m1".to_string(),
                content: "hacked".to_string(),
            })
            .await;

        assert_eq!(names(&drain(&mut rx_b)), ["error"]);
        assert!(drain(&mut rx_a).is_empty());
    }

    /// Mocks for one send of `message` from alice to bob in `c1`.
    ///
    /// `with_lookup` queues the participant lookup the socket path performs.
    fn single_send_dbs(message: chat_message::Model, with_lookup: bool) -> Dbs {
        let conv = create_test_conversation("c1", "alice", "bob");
        let mut updated = conv.clone();
        updated.last_message = message.content.clone();
        updated.user2_unread = 1;

        let mut lookups = vec![vec![updated]];
        if with_lookup {
            lookups.insert(0, vec![conv]);
        }

        Dbs {
            conversations: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results(lookups)
                    .append_exec_results([exec_ok(), exec_ok()])
                    .into_connection(),
            ),
            messages: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([[message]])
                    .into_connection(),
            ),
            users: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([[create_test_user("alice", "Alice")]])
                    .into_connection(),
            ),
            notifications: Arc::new(
                MockDatabase::new(DatabaseBackend::Postgres)
                    .append_query_results([[notification::Model {
                        id: "n1".to_string(),
                        user_id: "bob".to_string(),
                        kind: notification::NotificationKind::NewMessage,
                        message: "New message from Alice".to_string(),
                        related_id: "c1".to_string(),
                        is_read: false,
                        created_at: chrono::Utc::now().into(),
                    }]])
                    .into_connection(),
            ),
        }
    }

    #[tokio::test]
    async fn test_fallback_send_matches_realtime_payload() {
        let stored = create_test_message("m1", "alice", "hi");

        let (realtime, _) = coordinator(single_send_dbs(stored.clone(), true));
        let (a, _rx_a) = realtime.connect("alice").await;
        let (bob_rt, mut rx_rt) = realtime.connect("bob").await;
        realtime.hub().join(a.id, "c1").await;
        realtime.hub().join(bob_rt.id, "c1").await;
        realtime.handle(&a, send("c1", "alice", "hi", "t1")).await;

        let (fallback, _) = coordinator(single_send_dbs(stored, false));
        let (bob_fb, mut rx_fb) = fallback.connect("bob").await;
        fallback.hub().join(bob_fb.id, "c1").await;
        let input = CreateMessageInput {
            content: "hi".to_string(),
            ..Default::default()
        };
        let returned = fallback
            .submit(
                &create_test_conversation("c1", "alice", "bob"),
                "alice",
                input,
                Some("t1".to_string()),
                None,
            )
            .await
            .unwrap();

        let from_socket = drain(&mut rx_rt);
        let from_http = drain(&mut rx_fb);
        assert_eq!(names(&from_socket), names(&from_http));
        let (ServerEvent::ReceiveMessage(socket_payload), ServerEvent::ReceiveMessage(http_payload)) =
            (&from_socket[0], &from_http[0])
        else {
            panic!("expected receive_message on both paths");
        };
        assert_eq!(socket_payload, http_payload);
        assert_eq!(&returned, http_payload);
    }

    #[tokio::test]
    async fn test_deleting_latest_message_empties_summary() {
        let original = create_test_message("m1", "alice", "hi");
        let mut tombstone = original.clone();
        tombstone.content = chat_message::TOMBSTONE.to_string();
        tombstone.is_deleted = true;

        let messages = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([
                    vec![original.clone()],
                    vec![original],
                    vec![tombstone],
                    vec![],
                ])
                .into_connection(),
        );
        let users = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_user("alice", "Alice")]])
                .into_connection(),
        );
        let conversations = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec_ok()])
                .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
                .into_connection(),
        );
        let (coordinator, _) = coordinator(Dbs {
            messages,
            conversations: conversations.clone(),
            users,
            ..Default::default()
        });
        let (b, mut rx_b) = coordinator.connect("bob").await;
        coordinator.hub().join(b.id, "c1").await;

        let payload = coordinator.delete_message("alice", "m1").await.unwrap();
        assert!(payload.is_deleted);

        let events = drain(&mut rx_b);
        assert_eq!(names(&events), ["message_deleted", "chat_updated"]);
        let ServerEvent::ChatUpdated(summary) = &events[1] else {
            panic!("expected chat_updated");
        };
        assert_eq!(summary.last_message, EMPTY_SUMMARY);
        assert_eq!(summary.last_message_at, None);
        drop(coordinator);

        let log = format!("{:?}", Arc::try_unwrap(conversations).unwrap().into_transaction_log());
        assert!(log.contains(EMPTY_SUMMARY));
    }

    #[tokio::test]
    async fn test_seen_echo_lists_only_eligible_ids() {
        let conv = create_test_conversation("c1", "alice", "bob");
        let conversations = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[conv.clone()], [conv]])
                .append_exec_results([exec_ok()])
                .into_connection(),
        );
        // Of m1 (from alice) and m9 (bob's own), only m1 is eligible.
        let eligible: Vec<BTreeMap<&str, Value>> =
            vec![BTreeMap::from([("id", Value::from("m1"))])];
        let messages = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([eligible])
                .into_connection(),
        );
        let (coordinator, _) = coordinator(Dbs {
            conversations,
            messages,
            ..Default::default()
        });
        let (a, mut rx_a) = coordinator.connect("alice").await;
        coordinator.hub().join(a.id, "c1").await;

        coordinator
            .mark_messages_seen("bob", "c1", &["m1".to_string(), "m9".to_string()])
            .await
            .unwrap();

        let events = drain(&mut rx_a);
        assert_eq!(names(&events), ["messages_seen", "chat_updated"]);
        let ServerEvent::MessagesSeen {
            message_ids,
            user_id,
            ..
        } = &events[0]
        else {
            panic!("expected messages_seen");
        };
        assert_eq!(message_ids, &["m1".to_string()]);
        assert_eq!(user_id, "bob");
    }

    #[tokio::test]
    async fn test_disconnect_clears_presence() {
        let conversations = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_conversation("c1", "alice", "bob")]])
                .into_connection(),
        );
        let (coordinator, presence) = coordinator(Dbs {
            conversations,
            ..Default::default()
        });
        let (ctx, _rx) = coordinator.connect("alice").await;
        coordinator.register(&ctx, "alice").await.unwrap();

        coordinator.disconnect(&ctx).await;

        assert_eq!(presence.lookup("alice").await, None);
        assert_eq!(coordinator.hub().room_size("c1").await, 0);
    }
}
