//! Scripted inference transport for tests.
//!
//! Each call to `open` consumes the next queued script. A script is either a
//! refusal (the connection fails) or a sequence of steps played back as the
//! event stream. Opens and stream drops are counted so tests can check that
//! every session releases its connection exactly once.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use murmur_core::{
    EventStream, InferenceTransport, MalformedEventError, StreamEvent, StreamRequest, Token,
    TransportError,
};

/// One step of a scripted stream.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Yield a decoded event.
    Event(StreamEvent),
    /// Yield a droppable malformed-event error.
    Malformed(MalformedEventError),
    /// Yield a terminal transport error.
    Fail(TransportError),
    /// Wait before the next step.
    Delay(Duration),
    /// Never yield again; the stream stays open until dropped.
    Hang,
}

impl ScriptStep {
    pub fn text(delta: impl Into<String>) -> Self {
        Self::Event(StreamEvent::TextDelta(delta.into()))
    }

    pub fn token(text: impl Into<String>, id: i64, probability: f32) -> Self {
        Self::Event(StreamEvent::Token(Token {
            text: text.into(),
            id,
            probability,
            top5: Vec::new(),
        }))
    }

    pub const fn done() -> Self {
        Self::Event(StreamEvent::Done)
    }
}

#[derive(Debug)]
enum Script {
    Steps(Vec<ScriptStep>),
    Refuse(TransportError),
}

/// Inference transport that plays back queued scripts.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<StreamRequest>>,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the stream for the next `open`.
    pub fn push_script(&self, steps: Vec<ScriptStep>) {
        self.lock_scripts().push_back(Script::Steps(steps));
    }

    /// Make the next `open` fail.
    pub fn push_refusal(&self, error: TransportError) {
        self.lock_scripts().push_back(Script::Refuse(error));
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of event streams that have been dropped.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn lock_scripts(&self) -> std::sync::MutexGuard<'_, VecDeque<Script>> {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counts the stream as closed when dropped.
struct CloseGuard(Arc<AtomicUsize>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct PlaybackState {
    steps: VecDeque<ScriptStep>,
    _guard: CloseGuard,
}

#[async_trait]
impl InferenceTransport for ScriptedTransport {
    async fn open(&self, request: StreamRequest) -> Result<EventStream, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let script = self
            .lock_scripts()
            .pop_front()
            .ok_or_else(|| TransportError::Connect("no script queued".to_string()))?;

        let steps = match script {
            Script::Steps(steps) => steps,
            Script::Refuse(error) => return Err(error),
        };

        let state = PlaybackState {
            steps: steps.into(),
            _guard: CloseGuard(Arc::clone(&self.closes)),
        };

        Ok(futures_util::stream::unfold(state, |mut st| async move {
            loop {
                match st.steps.pop_front()? {
                    ScriptStep::Event(event) => return Some((Ok(event), st)),
                    ScriptStep::Malformed(error) => return Some((Err(error.into()), st)),
                    ScriptStep::Fail(error) => return Some((Err(error.into()), st)),
                    ScriptStep::Delay(duration) => tokio::time::sleep(duration).await,
                    ScriptStep::Hang => std::future::pending::<()>().await,
                }
            }
        })
        .boxed())
    }
}
