//! Stream and controller events.
//!
//! [`StreamEvent`] is what a transport yields after decoding the wire.
//! [`ControllerEvent`] is what the session manager emits to its observer.
//!
//! # Wire Format
//!
//! Controller events serialize with a `type` tag so they can be written as
//! JSON lines:
//!
//! ```json
//! { "type": "restart_scheduled", "delay_ms": 500 }
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::{Generation, Token};

/// Identifier of one stream session, unique per manager.
pub type SessionId = u64;

/// Lifecycle state of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No connection.
    #[default]
    Idle,
    /// Request sent, nothing received yet.
    Connecting,
    /// At least one event received.
    Streaming,
    /// `done` received; the generation is committed.
    Completed,
    /// Transport failure; the partial generation is discarded.
    Errored,
}

impl SessionState {
    /// True for `Connecting` and `Streaming`.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

/// One decoded event from the inference stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Unnamed `message` event: a plain UTF-8 text delta.
    TextDelta(String),
    /// `token_data` event.
    Token(Token),
    /// `done` event: the generation is complete.
    Done,
}

/// Events emitted by the session manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// A session moved to a new state.
    StateChanged {
        session_id: SessionId,
        state: SessionState,
    },

    /// The current response grew.
    ResponseUpdated {
        session_id: SessionId,
        /// The fragment just appended.
        delta: String,
        /// Full response so far.
        response: String,
    },

    /// A structured token was accepted.
    TokenReceived { session_id: SessionId, token: Token },

    /// A single malformed event was dropped.
    EventDropped { session_id: SessionId, reason: String },

    /// A finished generation entered the history.
    Committed { generation: Box<Generation> },

    /// A failed session's partial output was thrown away.
    Discarded {
        session_id: SessionId,
        reason: String,
        /// Characters accumulated before the failure.
        partial_chars: usize,
    },

    /// The next session will start after `delay_ms`.
    RestartScheduled { delay_ms: u64 },

    /// The auto-restart gate changed.
    PauseChanged { paused: bool },

    /// The base context for the next session changed.
    ContextChanged { context: String },
}
