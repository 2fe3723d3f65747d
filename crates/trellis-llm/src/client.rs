use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use log::debug;
use reqwest::Client;

use trellis_core::{ChatRequest, StreamEvent};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::sse::SseDecoder;

/// Ordered stream of decoded gateway events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Seam for issuing chat requests against the hosted gateway.
///
/// The production implementation is [`GatewayClient`]; tests substitute
/// scripted implementations.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Issue a streaming chat request
    async fn stream_chat(&self, request: ChatRequest) -> Result<EventStream>;
}

/// HTTP client for the hosted LLM gateway
pub struct GatewayClient {
    config: GatewayConfig,
    http: Client,
}

impl GatewayClient {
    /// Create a client from the given configuration
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::transport(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Access the configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

#[async_trait]
impl ChatGateway for GatewayClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<EventStream> {
        let mut request = request.streamed();
        if request.model.is_none() {
            request.model = self.config.model.clone();
        }

        let url = format!("{}/chat/completions", self.config.base_url);
        let mut builder = self.http.post(&url).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        for (key, value) in &self.config.headers {
            builder = builder.header(key, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        debug!("gateway stream opened ({} messages sent)", request.messages.len());
        Ok(decode_stream(response.bytes_stream()))
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

/// Adapt a raw body stream into an [`EventStream`].
///
/// Each chunk is fed through the incremental decoder; a read error yields a
/// single transport error and ends the stream; body end triggers the
/// decoder's best-effort flush. Reading stops once `Done` is emitted.
pub fn decode_stream<S, B, E>(body: S) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                if event.is_done() {
                    state.done = true;
                }
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    state.pending.extend(state.decoder.feed(chunk.as_ref()));
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(GatewayError::transport(e.to_string())), state));
                }
                // finish() always queues Done, so the loop terminates
                None => state.pending.extend(state.decoder.finish()),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_chunk(text: &str) -> std::result::Result<Vec<u8>, std::io::Error> {
        Ok(text.as_bytes().to_vec())
    }

    async fn collect(stream: EventStream) -> Vec<Result<StreamEvent>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_decode_stream_reassembles_split_chunks() {
        let chunks = vec![
            ok_chunk("data: {\"choices\":[{\"delta\":{\"con"),
            ok_chunk("tent\":\"GRE\"}}]}\ndata: [DONE]\n"),
        ];
        let events = collect(decode_stream(stream::iter(chunks))).await;

        let events: Vec<_> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![StreamEvent::delta("GRE"), StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_decode_stream_stops_after_done() {
        let chunks = vec![
            ok_chunk("data: [DONE]\n"),
            ok_chunk("data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n"),
        ];
        let events = collect(decode_stream(stream::iter(chunks))).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].as_ref().unwrap().is_done());
    }

    #[tokio::test]
    async fn test_decode_stream_surfaces_read_error_once() {
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            ok_chunk("data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n"),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
        ];
        let events = collect(decode_stream(stream::iter(chunks))).await;

        assert_eq!(events.len(), 2);
        assert_eq!(
            *events[0].as_ref().unwrap(),
            StreamEvent::delta("par")
        );
        assert!(matches!(
            events[1],
            Err(GatewayError::Transport { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_decode_stream_flushes_on_body_end() {
        let chunks = vec![ok_chunk(
            "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}",
        )];
        let events = collect(decode_stream(stream::iter(chunks))).await;
        let events: Vec<_> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![StreamEvent::delta("tail"), StreamEvent::Done]
        );
    }
}
