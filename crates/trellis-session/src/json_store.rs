//! JSON-file conversation store.
//!
//! Storage layout:
//!
//! ```text
//! <base_path>/
//! └── <conversation_id>.json    # owner, metadata, and message history
//! ```
//!
//! One document per conversation keeps saves simple read-modify-write
//! operations; recency listing sorts on the embedded `updated_at`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use trellis_core::{Conversation, ConversationId, Message, UserId};

use crate::error::{StoreError, StoreResult};
use crate::store::ConversationStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConversationRecord {
    owner: UserId,
    conversation: Conversation,
    messages: Vec<Message>,
}

/// File-backed [`ConversationStore`]
#[derive(Debug, Clone)]
pub struct JsonStore {
    base_path: PathBuf,
}

impl JsonStore {
    /// Open a store rooted at `base_path`, creating the directory if needed
    pub async fn open(base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        debug!("conversation store opened at {}", base_path.display());
        Ok(Self { base_path })
    }

    fn record_path(&self, conversation_id: &ConversationId) -> PathBuf {
        self.base_path.join(format!("{conversation_id}.json"))
    }

    async fn read_record(&self, conversation_id: &ConversationId) -> StoreResult<ConversationRecord> {
        let path = self.record_path(conversation_id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ConversationNotFound {
                    id: conversation_id.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_record(&self, record: &ConversationRecord) -> StoreResult<()> {
        let path = self.record_path(&record.conversation.id);
        let bytes = serde_json::to_vec_pretty(record)?;
        fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn read_record_at(path: &Path) -> StoreResult<ConversationRecord> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ConversationStore for JsonStore {
    async fn create_conversation(
        &self,
        user: &UserId,
        title: &str,
    ) -> StoreResult<Conversation> {
        let conversation = Conversation::new(title);
        let record = ConversationRecord {
            owner: user.clone(),
            conversation: conversation.clone(),
            messages: Vec::new(),
        };
        self.write_record(&record).await?;
        Ok(conversation)
    }

    async fn save_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> StoreResult<()> {
        let mut record = self.read_record(conversation_id).await?;
        record.messages.push(message.clone());
        self.write_record(&record).await
    }

    async fn load_conversations(&self, user: &UserId) -> StoreResult<Vec<Conversation>> {
        let mut conversations = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record_at(&path).await {
                Ok(record) if record.owner == *user => conversations.push(record.conversation),
                Ok(_) => {}
                Err(e) => warn!("skipping unreadable record {}: {}", path.display(), e),
            }
        }
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn load_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<Vec<Message>> {
        Ok(self.read_record(conversation_id).await?.messages)
    }

    async fn delete_conversation(&self, conversation_id: &ConversationId) -> StoreResult<()> {
        match fs::remove_file(self.record_path(conversation_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::ConversationNotFound {
                    id: conversation_id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn touch_conversation(&self, conversation_id: &ConversationId) -> StoreResult<()> {
        let mut record = self.read_record(conversation_id).await?;
        record.conversation.touch();
        self.write_record(&record).await
    }
}
