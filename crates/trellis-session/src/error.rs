use thiserror::Error;

use trellis_llm::GatewayError;

/// Persistence error type.
///
/// Store failures are logged and never roll back the in-memory transcript.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("conversation not found: {id}")]
    ConversationNotFound { id: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a conversation session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type SessionResult<T> = Result<T, SessionError>;
