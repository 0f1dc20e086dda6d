//! Database entities.

pub mod chat_message;
pub mod conversation;
pub mod following;
pub mod id_list;
pub mod notification;
pub mod user;

pub use chat_message::Entity as ChatMessage;
pub use conversation::Entity as Conversation;
pub use following::Entity as Following;
pub use notification::Entity as Notification;
pub use user::Entity as User;
