//! # Trellis Session
//!
//! Chat-state reconciliation for the Trellis client: the transcript
//! reducer, the per-session send/receive orchestrator, and the
//! persistence seam conversations are saved through.
//!
//! A session owns one transcript at a time. `send` appends the user
//! message, replays the full visible history to the gateway, applies
//! streamed deltas in order, and persists finalized messages best-effort.
//! Switching conversations mid-stream abandons the old stream without
//! letting its remaining deltas touch the new transcript.

pub mod auth;
pub mod error;
pub mod json_store;
pub mod memory;
pub mod session;
pub mod store;
pub mod transcript;

pub use auth::{AuthSource, SharedAuth};
pub use error::{SessionError, SessionResult, StoreError, StoreResult};
pub use json_store::JsonStore;
pub use memory::MemoryStore;
pub use session::{ConversationSession, SendOutcome, SessionState};
pub use store::ConversationStore;
pub use transcript::Transcript;

/// Default on-disk location for the JSON conversation store
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".trellis").join("conversations"))
        .unwrap_or_else(|| std::path::PathBuf::from("./trellis_conversations"))
}
