use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique message identifier
pub type MessageId = String;

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Lifecycle of a message's content.
///
/// A `Streaming` message is still receiving deltas and may be mutated by the
/// transcript; a `Final` message is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Streaming,
    Final,
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a user message (final immediately)
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            status: MessageStatus::Final,
            created_at: Utc::now(),
        }
    }

    /// Create a final assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            status: MessageStatus::Final,
            created_at: Utc::now(),
        }
    }

    /// Create an empty in-flight assistant message.
    ///
    /// The id is a transient placeholder; a durable id is assigned when the
    /// message is finalized.
    pub fn streaming_assistant() -> Self {
        Self {
            id: format!("pending-{}", Uuid::new_v4()),
            role: Role::Assistant,
            content: String::new(),
            status: MessageStatus::Streaming,
            created_at: Utc::now(),
        }
    }

    /// Check if this message is still receiving deltas
    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_is_final() {
        let msg = Message::user("Hello");
        assert_eq!(msg.content, "Hello");
        assert!(matches!(msg.role, Role::User));
        assert_eq!(msg.status, MessageStatus::Final);
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_streaming_assistant_placeholder() {
        let msg = Message::streaming_assistant();
        assert!(msg.is_streaming());
        assert!(msg.content.is_empty());
        assert!(msg.id.starts_with("pending-"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
