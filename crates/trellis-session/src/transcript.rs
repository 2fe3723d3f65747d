//! Ordered, observable chat transcript.
//!
//! Streamed deltas accumulate in an explicit `streaming` slot rather than in
//! the message list, so at most one in-flight assistant message exists and
//! reloading history can never be confused with a streaming tail.

use uuid::Uuid;

use trellis_core::{Message, MessageStatus};

/// The in-memory transcript of one conversation.
///
/// Mutations bump `version`, so observers can poll `version()` and pull
/// `snapshot()` when it changes.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    streaming: Option<Message>,
    version: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a final message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.bump();
    }

    /// Append a delta to the in-flight assistant message, creating it on the
    /// first delta. An empty delta is a no-op.
    pub fn apply_delta(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let current = self
            .streaming
            .get_or_insert_with(Message::streaming_assistant);
        current.content.push_str(text);
        self.bump();
    }

    /// Seal the in-flight assistant message: a fresh durable id replaces the
    /// transient placeholder and the message joins the ordered list.
    ///
    /// Idempotent — with no message streaming this is a no-op, which guards
    /// against a completion signal arriving after the session was reset.
    pub fn finalize(&mut self) -> Option<Message> {
        let mut message = self.streaming.take()?;
        message.id = Uuid::new_v4().to_string();
        message.status = MessageStatus::Final;
        self.messages.push(message.clone());
        self.bump();
        Some(message)
    }

    /// Clear all state
    pub fn reset(&mut self) {
        self.messages.clear();
        self.streaming = None;
        self.bump();
    }

    /// Replace the transcript with a loaded history
    pub fn reset_with(&mut self, history: Vec<Message>) {
        self.messages = history;
        self.streaming = None;
        self.bump();
    }

    /// The full visible transcript, streaming message last
    pub fn snapshot(&self) -> Vec<Message> {
        let mut messages = self.messages.clone();
        if let Some(ref streaming) = self.streaming {
            messages.push(streaming.clone());
        }
        messages
    }

    pub fn has_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    pub fn len(&self) -> usize {
        self.messages.len() + usize::from(self.streaming.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}
