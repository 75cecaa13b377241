//! SSE frame to [`StreamEvent`] mapping.

use murmur_core::{MalformedEventError, StreamError, StreamEvent, Token, TransportError};

use crate::sse::SseFrame;

/// Event names sent by the inference server.
pub mod event_names {
    pub const MESSAGE: &str = "message";
    pub const TOKEN_DATA: &str = "token_data";
    pub const DONE: &str = "done";
    pub const ERROR: &str = "error";
}

/// Decode one frame.
///
/// `error` frames become a terminal [`TransportError::Server`]; anything that
/// cannot be understood is a droppable [`MalformedEventError`].
pub fn decode_frame(frame: &SseFrame) -> Result<StreamEvent, StreamError> {
    match frame.event.as_str() {
        event_names::MESSAGE => Ok(StreamEvent::TextDelta(frame.data.clone())),
        event_names::TOKEN_DATA => Token::from_json(&frame.data)
            .map(StreamEvent::Token)
            .map_err(|e| MalformedEventError::InvalidToken(e.to_string()).into()),
        event_names::DONE => Ok(StreamEvent::Done),
        event_names::ERROR => {
            let message = if frame.data.trim().is_empty() {
                "unspecified".to_string()
            } else {
                frame.data.clone()
            };
            Err(TransportError::Server(message).into())
        }
        other => Err(MalformedEventError::UnknownEvent(other.to_string()).into()),
    }
}
