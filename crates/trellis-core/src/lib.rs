pub mod chat;
pub mod types;

// Re-export core types
pub use chat::{ChatMessage, ChatRequest, StreamEvent};
pub use types::{
    derive_title,
    Conversation,
    ConversationId,
    Message,
    MessageId,
    MessageStatus,
    Role,
    UserId,
};
