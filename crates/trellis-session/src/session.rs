//! Per-session send/receive orchestration.
//!
//! One send-receive cycle: append the user message, lazily bind a
//! conversation record, replay the full visible history to the gateway,
//! apply streamed deltas in arrival order, finalize, persist. A generation
//! counter makes delta application a no-op once the session has moved on to
//! a different conversation, even while the abandoned stream keeps
//! draining.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use trellis_core::{derive_title, ChatRequest, Conversation, ConversationId, Message, StreamEvent, UserId};
use trellis_llm::ChatGateway;

use crate::auth::AuthSource;
use crate::error::{SessionResult, StoreResult};
use crate::store::ConversationStore;
use crate::transcript::Transcript;

const STATE_IDLE: u8 = 0;
const STATE_SENDING: u8 = 1;
const STATE_STREAMING: u8 = 2;

/// Session state machine: only `Idle` accepts a new send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Request issued, waiting for the response to open
    Sending,
    /// Receiving and applying deltas
    Streaming,
}

/// What a `send` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The reply streamed to completion
    Completed,
    /// Empty input or a send already in flight; nothing happened
    Rejected,
    /// The session switched conversation mid-stream; the reply was abandoned
    Cancelled,
}

/// Orchestrates one conversation's send-receive cycles.
///
/// The transcript is owned by exactly one session; all mutation goes through
/// it. Persistence is best-effort and never blocks or rolls back the
/// in-memory transcript.
pub struct ConversationSession {
    gateway: Arc<dyn ChatGateway>,
    store: Arc<dyn ConversationStore>,
    auth: Arc<dyn AuthSource>,
    transcript: Mutex<Transcript>,
    conversation: Mutex<Option<ConversationId>>,
    state: AtomicU8,
    generation: AtomicU64,
}

impl ConversationSession {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        store: Arc<dyn ConversationStore>,
        auth: Arc<dyn AuthSource>,
    ) -> Self {
        Self {
            gateway,
            store,
            auth,
            transcript: Mutex::new(Transcript::new()),
            conversation: Mutex::new(None),
            state: AtomicU8::new(STATE_IDLE),
            generation: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_SENDING => SessionState::Sending,
            STATE_STREAMING => SessionState::Streaming,
            _ => SessionState::Idle,
        }
    }

    /// Snapshot of the visible transcript
    pub fn messages(&self) -> Vec<Message> {
        self.transcript.lock().snapshot()
    }

    /// Transcript version, bumped on every mutation
    pub fn version(&self) -> u64 {
        self.transcript.lock().version()
    }

    /// The bound conversation record, if any message was persisted yet
    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation.lock().clone()
    }

    /// Send a user message and stream the reply into the transcript.
    ///
    /// Whitespace-only input and sends while another request is in flight
    /// are rejected as no-ops. Gateway failures surface exactly once; the
    /// in-flight flag is cleared on every exit path.
    pub async fn send(&self, text: &str) -> SessionResult<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring empty input");
            return Ok(SendOutcome::Rejected);
        }
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_SENDING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("send rejected: a request is already in flight");
            return Ok(SendOutcome::Rejected);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let user_message = Message::user(text);
        let request = {
            let mut transcript = self.transcript.lock();
            transcript.push(user_message.clone());
            // full-history replay: the model only knows what we send
            ChatRequest::from_history(&transcript.snapshot())
        };

        self.persist_message(&user_message).await;

        let result = self.run_stream(request, generation).await;
        self.state.store(STATE_IDLE, Ordering::SeqCst);
        result
    }

    async fn run_stream(
        &self,
        request: ChatRequest,
        generation: u64,
    ) -> SessionResult<SendOutcome> {
        let mut events = match self.gateway.stream_chat(request).await {
            Ok(events) => events,
            Err(e) => {
                warn!("gateway request failed: {e}");
                return Err(e.into());
            }
        };
        self.state.store(STATE_STREAMING, Ordering::SeqCst);

        while let Some(item) = events.next().await {
            if self.abandoned(generation) {
                debug!("dropping event from an abandoned stream");
                return Ok(SendOutcome::Cancelled);
            }
            match item {
                Ok(StreamEvent::Delta(text)) => {
                    self.transcript.lock().apply_delta(&text);
                }
                Ok(StreamEvent::Done) => break,
                Ok(StreamEvent::ParseError) => {
                    debug!("undecodable trailing fragment dropped");
                }
                Err(e) => {
                    // keep whatever partial content already rendered;
                    // the failure surfaces to the caller exactly once
                    self.transcript.lock().finalize();
                    warn!("stream failed: {e}");
                    return Err(e.into());
                }
            }
        }

        if self.abandoned(generation) {
            return Ok(SendOutcome::Cancelled);
        }
        let finalized = self.transcript.lock().finalize();
        if let Some(message) = finalized {
            self.persist_message(&message).await;
        }
        Ok(SendOutcome::Completed)
    }

    fn abandoned(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    /// Best-effort persistence; failures are logged, never surfaced, and the
    /// rendered transcript is kept either way. Skipped entirely when no user
    /// is signed in.
    async fn persist_message(&self, message: &Message) {
        let Some(user) = self.auth.current_user() else {
            debug!("no signed-in user; keeping the conversation ephemeral");
            return;
        };
        let conversation_id = match self.ensure_conversation(&user, message).await {
            Ok(id) => id,
            Err(e) => {
                warn!("failed to create conversation record: {e}");
                return;
            }
        };
        if let Err(e) = self.store.save_message(&conversation_id, message).await {
            warn!("failed to save message: {e}");
            return;
        }
        if let Err(e) = self.store.touch_conversation(&conversation_id).await {
            warn!("failed to touch conversation: {e}");
        }
    }

    /// Bind a conversation record, creating it on the first saved message.
    /// The title derives from that first message and never changes here.
    async fn ensure_conversation(
        &self,
        user: &UserId,
        first: &Message,
    ) -> StoreResult<ConversationId> {
        if let Some(id) = self.conversation.lock().clone() {
            return Ok(id);
        }
        let conversation = self
            .store
            .create_conversation(user, &derive_title(&first.content))
            .await?;
        info!("created conversation {}", conversation.id);
        *self.conversation.lock() = Some(conversation.id.clone());
        Ok(conversation.id)
    }

    /// Switch to a stored conversation, abandoning any in-flight stream
    pub async fn select_conversation(&self, id: &ConversationId) -> SessionResult<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let history = self.store.load_messages(id).await?;
        self.transcript.lock().reset_with(history);
        *self.conversation.lock() = Some(id.clone());
        info!("switched to conversation {id}");
        Ok(())
    }

    /// Start a fresh, unbound conversation, abandoning any in-flight stream
    pub fn new_conversation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.transcript.lock().reset();
        *self.conversation.lock() = None;
        debug!("started a new conversation");
    }

    /// List the signed-in user's conversations, most recent first
    pub async fn list_conversations(&self) -> SessionResult<Vec<Conversation>> {
        match self.auth.current_user() {
            Some(user) => Ok(self.store.load_conversations(&user).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Delete a stored conversation; resets the session if it was current
    pub async fn delete_conversation(&self, id: &ConversationId) -> SessionResult<()> {
        self.store.delete_conversation(id).await?;
        if self.conversation_id().as_ref() == Some(id) {
            self.new_conversation();
        }
        Ok(())
    }
}
