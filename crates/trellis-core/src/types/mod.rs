pub mod conversation;
pub mod message;

pub use conversation::{derive_title, Conversation, ConversationId, UserId};
pub use message::{Message, MessageId, MessageStatus, Role};
