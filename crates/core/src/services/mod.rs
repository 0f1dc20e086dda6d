//! Business logic services.

#![allow(missing_docs)]

pub mod auth;
pub mod conversation;
pub mod coordinator;
pub mod events;
pub mod following;
pub mod hub;
pub mod messaging;
pub mod notification;
pub mod presence;

pub use auth::{Claims, TokenVerifier};
pub use conversation::{ConversationListItem, ConversationService, OpenedConversation};
pub use coordinator::{ChatCoordinator, ConnectionContext};
pub use events::{
    AttachmentPayload, AttachmentRef, ChatUpdatedPayload, ClientEvent, MessagePayload,
    NotificationPayload, ReplyPreview, SendMessageData, ServerEvent, UserSummary,
};
pub use following::{FollowOutcome, FollowingService};
pub use hub::{ConnectionId, RoomHub};
pub use messaging::{CreateMessageInput, MessageChange, MessagingService, NewAttachment};
pub use notification::NotificationService;
pub use presence::{InMemoryPresence, PresenceRegistry};
