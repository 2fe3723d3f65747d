//! In-memory conversation store for tests and ephemeral sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use trellis_core::{Conversation, ConversationId, Message, UserId};

use crate::error::{StoreError, StoreResult};
use crate::store::ConversationStore;

#[derive(Debug, Default)]
struct MemoryInner {
    owners: HashMap<ConversationId, UserId>,
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
}

/// HashMap-backed [`ConversationStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(
        &self,
        user: &UserId,
        title: &str,
    ) -> StoreResult<Conversation> {
        let conversation = Conversation::new(title);
        let mut inner = self.inner.write();
        inner.owners.insert(conversation.id.clone(), user.clone());
        inner
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        inner.messages.insert(conversation.id.clone(), Vec::new());
        Ok(conversation)
    }

    async fn save_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if !inner.conversations.contains_key(conversation_id) {
            return Err(StoreError::ConversationNotFound {
                id: conversation_id.clone(),
            });
        }
        inner
            .messages
            .entry(conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn load_conversations(&self, user: &UserId) -> StoreResult<Vec<Conversation>> {
        let inner = self.inner.read();
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| inner.owners.get(&c.id) == Some(user))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn load_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<Vec<Message>> {
        let inner = self.inner.read();
        inner
            .messages
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| StoreError::ConversationNotFound {
                id: conversation_id.clone(),
            })
    }

    async fn delete_conversation(&self, conversation_id: &ConversationId) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.owners.remove(conversation_id);
        inner.messages.remove(conversation_id);
        inner
            .conversations
            .remove(conversation_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::ConversationNotFound {
                id: conversation_id.clone(),
            })
    }

    async fn touch_conversation(&self, conversation_id: &ConversationId) -> StoreResult<()> {
        let mut inner = self.inner.write();
        match inner.conversations.get_mut(conversation_id) {
            Some(conversation) => {
                conversation.touch();
                Ok(())
            }
            None => Err(StoreError::ConversationNotFound {
                id: conversation_id.clone(),
            }),
        }
    }
}
