//! Repository layer.

mod chat_message;
mod conversation;
mod following;
mod notification;
mod user;

pub use chat_message::ChatMessageRepository;
pub use conversation::ConversationRepository;
pub use following::FollowingRepository;
pub use notification::NotificationRepository;
pub use user::UserRepository;
