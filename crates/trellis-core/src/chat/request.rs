use serde::Serialize;

use crate::types::{Message, Role};

/// One entry of the outbound message history
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Request body sent to the gateway.
///
/// Carries the entire visible transcript on every request — the model has no
/// memory beyond what is sent, so full-history replay is how multi-turn
/// context is achieved. No truncation is applied; context grows unbounded
/// with conversation length.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatRequest {
    /// Build a request from the visible transcript
    pub fn from_history(messages: &[Message]) -> Self {
        Self {
            messages: messages.iter().map(ChatMessage::from).collect(),
            model: None,
            stream: None,
        }
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Request a streamed response
    pub fn streamed(mut self) -> Self {
        self.stream = Some(true);
        self
    }
}
