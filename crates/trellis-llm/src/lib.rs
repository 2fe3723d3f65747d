pub mod client;
pub mod config;
pub mod error;
pub mod sse;

// Re-export core types
pub use client::{decode_stream, ChatGateway, EventStream, GatewayClient};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use sse::SseDecoder;
