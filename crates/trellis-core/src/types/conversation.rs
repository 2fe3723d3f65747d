use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique conversation identifier
pub type ConversationId = String;

/// Opaque identifier of the authenticated user a conversation belongs to
pub type UserId = String;

/// Maximum number of characters kept when deriving a title from the first
/// user message.
pub const MAX_TITLE_CHARS: usize = 48;

/// Conversation metadata.
///
/// Created lazily on the first saved message of a chat; `updated_at` is
/// touched on every saved message. The title is derived once and never
/// auto-changed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new conversation with the given title
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the recency timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Derive a conversation title from the first user input: trimmed and
/// truncated on a char boundary.
pub fn derive_title(text: &str) -> String {
    let text = text.trim();
    let mut title: String = text.chars().take(MAX_TITLE_CHARS).collect();
    if title.len() < text.len() {
        title.push('…');
    }
    title
}
