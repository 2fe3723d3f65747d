use async_trait::async_trait;

use trellis_core::{Conversation, ConversationId, Message, UserId};

use crate::error::StoreResult;

/// Persistence seam for conversations and their messages.
///
/// The session core calls these operations in message order and treats every
/// failure as non-fatal. Implementations are scoped to the authenticated
/// user; row-level access control is the backing store's responsibility and
/// is not re-checked here.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation owned by `user`
    async fn create_conversation(
        &self,
        user: &UserId,
        title: &str,
    ) -> StoreResult<Conversation>;

    /// Append a message to a conversation
    async fn save_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> StoreResult<()>;

    /// List a user's conversations, most recently updated first
    async fn load_conversations(&self, user: &UserId) -> StoreResult<Vec<Conversation>>;

    /// Load a conversation's messages in creation order
    async fn load_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<Vec<Message>>;

    /// Delete a conversation and its messages
    async fn delete_conversation(&self, conversation_id: &ConversationId) -> StoreResult<()>;

    /// Bump a conversation's recency timestamp
    async fn touch_conversation(&self, conversation_id: &ConversationId) -> StoreResult<()>;
}
