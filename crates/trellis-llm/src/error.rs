use thiserror::Error;

/// Unified error type for gateway operations.
///
/// Rate-limit and quota errors are surfaced to the caller and never retried
/// automatically; decode-level anomalies never appear here — the stream
/// decoder handles them locally.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("rate limited by the gateway, retry later")]
    RateLimited,

    #[error("usage quota exceeded")]
    QuotaExceeded,

    #[error("transport failure: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },
}

impl GatewayError {
    /// Create a transport error with no HTTP status (connection-level failure)
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status to a typed error
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            429 => Self::RateLimited,
            402 => Self::QuotaExceeded,
            _ => Self::Transport {
                status: Some(status),
                message: body.into(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
