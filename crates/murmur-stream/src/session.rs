//! One streaming generation and its connection.
//!
//! ```text
//!   Idle ─open─▶ Connecting ─first event─▶ Streaming ─done─▶ Completed
//!                    │                         │
//!                    └────────── error ────────┴──────────▶ Errored
//! ```
//!
//! The session owns the reader task that pulls from the transport. The
//! reader forwards everything to the session manager as [`SessionMessage`]s
//! tagged with the session id; the manager applies them back onto the
//! session on its own task, so the accumulator is only ever touched from one
//! place. [`StreamSession::close`] is the single teardown path and is
//! idempotent; it runs on done, on error, on stop and on drop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use murmur_core::{
    Generation, GenerationTag, InferenceTransport, MalformedEventError,
    SessionId, SessionState, StreamError, StreamEvent, StreamRequest, Token, TokenAccumulator,
    TransportError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ── Reader → manager messages ──────────────────────────────────────

/// Something the reader task observed on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMessage {
    pub session_id: SessionId,
    pub payload: SessionPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionPayload {
    /// A decoded event, in arrival order.
    Event(StreamEvent),
    /// One event could not be decoded and was dropped.
    Malformed(MalformedEventError),
    /// The stream failed; nothing further follows.
    Failed(TransportError),
}

/// What applying an event did to the session.
///
/// `delta` is the newly visible tail of the response, `None` when the
/// fragment repeated output the other channel already delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A text delta was accepted.
    Text { delta: Option<String> },
    /// A token was accepted.
    Token { token: Token, delta: Option<String> },
    /// `done` arrived; the session is `Completed` and closed.
    Completed,
    /// The session had already finished; the event was ignored.
    Ignored,
}

// ── Session ────────────────────────────────────────────────────────

pub struct StreamSession {
    id: SessionId,
    state: SessionState,
    request: StreamRequest,
    accumulator: TokenAccumulator,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl StreamSession {
    /// Create an idle session for one request.
    #[must_use]
    pub fn new(id: SessionId, request: StreamRequest) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            request,
            accumulator: TokenAccumulator::new(),
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
            reader: None,
            closed: false,
        }
    }

    pub const fn id(&self) -> SessionId {
        self.id
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// True while `Connecting` or `Streaming`.
    pub const fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn current_response(&self) -> &str {
        self.accumulator.current_response()
    }

    /// Characters accumulated so far.
    pub fn partial_chars(&self) -> usize {
        self.accumulator.current_response().chars().count()
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Send the request and start forwarding stream items to `tx`.
    ///
    /// Only an idle session can be opened; later calls are ignored.
    pub fn open(
        &mut self,
        transport: Arc<dyn InferenceTransport>,
        tx: mpsc::UnboundedSender<SessionMessage>,
    ) {
        if self.state != SessionState::Idle || self.closed {
            tracing::debug!(session_id = self.id, state = ?self.state, "Session already opened");
            return;
        }

        self.started_at = Utc::now();
        self.state = SessionState::Connecting;
        tracing::info!(session_id = self.id, "Opening stream session");

        let reader = read_stream(
            self.id,
            transport,
            self.request.clone(),
            self.cancel.clone(),
            tx,
        );
        self.reader = Some(tokio::spawn(reader));
    }

    /// Record that something arrived. Returns true on `Connecting → Streaming`.
    pub fn note_inbound(&mut self) -> bool {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Streaming;
            true
        } else {
            false
        }
    }

    /// Apply one decoded event.
    pub fn apply(&mut self, event: StreamEvent) -> SessionUpdate {
        if !self.is_connected() {
            return SessionUpdate::Ignored;
        }
        self.note_inbound();

        match event {
            StreamEvent::TextDelta(text) => SessionUpdate::Text {
                delta: self.accumulator.push_text(&text),
            },
            StreamEvent::Token(token) => {
                let delta = self.accumulator.push_token(token.clone());
                SessionUpdate::Token { token, delta }
            }
            StreamEvent::Done => {
                self.state = SessionState::Completed;
                tracing::info!(
                    session_id = self.id,
                    fragments = self.accumulator.fragment_count(),
                    "Stream session completed"
                );
                self.close();
                SessionUpdate::Completed
            }
        }
    }

    /// Abort on a transport failure. The partial output is kept only until
    /// the session is dropped.
    pub fn fail(&mut self, error: &TransportError) {
        if self.state.is_terminal() {
            return;
        }
        tracing::warn!(session_id = self.id, error = %error, "Stream session failed");
        self.state = SessionState::Errored;
        self.close();
    }

    /// Release the connection. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        // The reader drops the event stream when it observes the cancel.
        drop(self.reader.take());
        tracing::debug!(session_id = self.id, state = ?self.state, "Stream session closed");
    }

    /// Build the committed generation. Only meaningful after `Completed`.
    #[must_use]
    pub fn into_generation(mut self, tag: GenerationTag) -> Generation {
        let content = std::mem::take(&mut self.accumulator).into_content();
        Generation::new(
            tag,
            self.request.context.clone(),
            self.request.config.clone(),
            content,
            self.started_at,
        )
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("response_chars", &self.partial_chars())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

// ── Reader task ────────────────────────────────────────────────────

async fn read_stream(
    session_id: SessionId,
    transport: Arc<dyn InferenceTransport>,
    request: StreamRequest,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<SessionMessage>,
) {
    let send = |payload: SessionPayload| {
        tx.send(SessionMessage {
            session_id,
            payload,
        })
        .is_ok()
    };

    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        opened = transport.open(request) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            send(SessionPayload::Failed(e));
            return;
        }
    };

    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            item = stream.next() => item,
        };

        let (payload, last) = match item {
            Some(Ok(event)) => {
                let done = event == StreamEvent::Done;
                (SessionPayload::Event(event), done)
            }
            Some(Err(StreamError::Malformed(e))) => (SessionPayload::Malformed(e), false),
            Some(Err(StreamError::Transport(e))) => (SessionPayload::Failed(e), true),
            None => (SessionPayload::Failed(TransportError::EndedWithoutDone), true),
        };

        if !send(payload) || last {
            break;
        }
    }
    // `stream` drops here, closing the connection.
}
