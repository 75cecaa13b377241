//! Inference transport port.
//!
//! This port opens one streaming generation request and yields decoded
//! [`StreamEvent`]s. It says nothing about HTTP or SSE; the reqwest adapter
//! lives in `murmur-stream`.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::domain::SamplingConfig;
use crate::events::StreamEvent;

/// Everything sent with one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// Prompt text the generation continues from.
    pub context: String,
    /// Parameter snapshot taken when the session started.
    pub config: SamplingConfig,
}

impl StreamRequest {
    #[must_use]
    pub const fn new(context: String, config: SamplingConfig) -> Self {
        Self { context, config }
    }

    /// Query parameters: `context` first, then every sampling field.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(13);
        pairs.push(("context", self.context.clone()));
        pairs.extend(self.config.query_pairs());
        pairs
    }
}

/// Terminal failure of a stream. The session is aborted and its partial
/// output discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent.
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// The server answered with a non-success status.
    #[error("Server returned HTTP {status}")]
    Status { status: u16 },

    /// The byte stream broke mid-generation.
    #[error("Stream interrupted: {0}")]
    Interrupted(String),

    /// The stream closed before a `done` event.
    #[error("Stream ended without a done event")]
    EndedWithoutDone,

    /// The server sent an `error` event.
    #[error("Server reported an error: {0}")]
    Server(String),
}

/// A single event could not be decoded. The event is dropped and the
/// stream continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedEventError {
    #[error("Invalid token_data payload: {0}")]
    InvalidToken(String),

    #[error("Unknown event type: {0}")]
    UnknownEvent(String),
}

/// Item error of an [`EventStream`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Malformed(#[from] MalformedEventError),
}

impl StreamError {
    /// Whether the stream must be abandoned.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Decoded event stream of one request. Dropping it closes the connection.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, StreamError>> + Send>>;

/// Opens streaming generation requests.
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    /// Send the request and return its event stream.
    ///
    /// Connection and status failures are reported here; failures after the
    /// stream is returned arrive as stream items.
    async fn open(&self, request: StreamRequest) -> Result<EventStream, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pairs_start_with_context() {
        let request = StreamRequest::new("hi".into(), SamplingConfig::default());
        let pairs = request.query_pairs();
        assert_eq!(pairs[0], ("context", "hi".to_string()));
        assert_eq!(pairs.len(), 13);
        assert_eq!(pairs[12].0, "hot_word_boost");
    }

    #[test]
    fn test_only_transport_errors_are_terminal() {
        assert!(StreamError::from(TransportError::EndedWithoutDone).is_terminal());
        assert!(!StreamError::from(MalformedEventError::UnknownEvent("x".into())).is_terminal());
    }
}
