//! Narration queue actor.
//!
//! One tokio task owns the pending chunks, the utterance in flight and the
//! pacing timer. [`SpeechQueueHandle`] implements [`NarrationPort`] by
//! posting commands to that task, so the session manager never waits on
//! speech and a failing engine cannot stall the text pipeline.
//!
//! ```text
//!   submit ─▶ pending ─▶ speaking ─▶ pacing (pause_after) ─▶ next chunk
//!                 ▲                                             │
//!                 └─────────────────────────────────────────────┘
//! ```
//!
//! Starting a new generation or cancelling drops the in-flight `speak`
//! future, which stops the engine, and clears everything queued.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use murmur_core::{
    LiveVoiceParams, NarrationError, NarrationPort, SessionId, SpeechChunk, SpeechGranularity,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};

use crate::backend::SpeechBackend;
use crate::phrases::PhraseAssembler;

type Utterance = Pin<Box<dyn Future<Output = Result<(), NarrationError>> + Send>>;

/// Snapshot of the queue for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechStatus {
    /// Engine name.
    pub backend: String,
    /// Chunks waiting behind the current utterance.
    pub pending: usize,
    pub speaking: bool,
    /// Holding the inter-utterance pause.
    pub pacing: bool,
    pub spoken: u64,
    pub failed: u64,
    /// False once the engine reported itself unusable.
    pub available: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("Speech queue has shut down")]
pub struct QueueClosed;

enum Command {
    Begin {
        session_id: SessionId,
    },
    Submit {
        session_id: SessionId,
        text: String,
    },
    Finish {
        session_id: SessionId,
    },
    CancelAll,
    Status {
        reply: oneshot::Sender<SpeechStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ── Handle ─────────────────────────────────────────────────────────

/// Cloneable handle to a running queue.
///
/// The queue cancels all speech and exits when the last handle is dropped.
#[derive(Debug, Clone)]
pub struct SpeechQueueHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SpeechQueueHandle {
    pub async fn status(&self) -> Result<SpeechStatus, QueueClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Status { reply })
            .map_err(|_| QueueClosed)?;
        rx.await.map_err(|_| QueueClosed)
    }

    /// Cancel all speech and wait for the queue task to exit.
    pub async fn shutdown(&self) -> Result<(), QueueClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Shutdown { reply })
            .map_err(|_| QueueClosed)?;
        rx.await.map_err(|_| QueueClosed)
    }

    fn post(&self, command: Command) {
        if self.tx.send(command).is_err() {
            tracing::trace!("Speech queue closed; narration command dropped");
        }
    }
}

impl NarrationPort for SpeechQueueHandle {
    fn begin_generation(&self, session_id: SessionId) {
        self.post(Command::Begin { session_id });
    }

    fn submit(&self, session_id: SessionId, text: &str) {
        self.post(Command::Submit {
            session_id,
            text: text.to_string(),
        });
    }

    fn finish_generation(&self, session_id: SessionId) {
        self.post(Command::Finish { session_id });
    }

    fn cancel_all(&self) {
        self.post(Command::CancelAll);
    }
}

// ── Queue ──────────────────────────────────────────────────────────

pub struct SpeechQueue {
    backend: Arc<dyn SpeechBackend>,
    voice: LiveVoiceParams,
    granularity: SpeechGranularity,
    generation: Option<SessionId>,
    phrases: PhraseAssembler,
    pending: VecDeque<SpeechChunk>,
    current: Option<(Utterance, SpeechChunk)>,
    resume_at: Option<Instant>,
    available: bool,
    spoken: u64,
    failed: u64,
}

impl SpeechQueue {
    /// Spawn the queue task and return its handle.
    pub fn spawn(
        backend: Arc<dyn SpeechBackend>,
        voice: LiveVoiceParams,
        granularity: SpeechGranularity,
    ) -> SpeechQueueHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            backend,
            voice,
            granularity,
            generation: None,
            phrases: PhraseAssembler::new(),
            pending: VecDeque::new(),
            current: None,
            resume_at: None,
            available: true,
            spoken: 0,
            failed: 0,
        };
        tokio::spawn(queue.run(rx));
        SpeechQueueHandle { tx }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!(
            backend = self.backend.name(),
            granularity = %self.granularity,
            "Speech queue started"
        );

        loop {
            self.start_next();
            let resume_at = self.resume_at;

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.cancel_all();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.cancel_all();
                        break;
                    }
                },

                result = wait_current(&mut self.current) => self.finish_utterance(result),

                () = sleep_until(resume_at.unwrap_or_else(Instant::now)), if resume_at.is_some() => {
                    self.resume_at = None;
                }
            }
        }

        tracing::debug!(spoken = self.spoken, failed = self.failed, "Speech queue exited");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Begin { session_id } => {
                self.cancel_all();
                self.generation = Some(session_id);
            }
            Command::Submit { session_id, text } => {
                if self.generation != Some(session_id) {
                    tracing::trace!(session_id, "Ignoring text from another generation");
                    return;
                }
                match self.granularity {
                    SpeechGranularity::Delta => self.enqueue(text),
                    SpeechGranularity::Phrase => {
                        for phrase in self.phrases.push(&text) {
                            self.enqueue(phrase);
                        }
                    }
                }
            }
            Command::Finish { session_id } => {
                if self.generation != Some(session_id) {
                    return;
                }
                if let Some(phrase) = self.phrases.flush() {
                    self.enqueue(phrase);
                }
            }
            Command::CancelAll => self.cancel_all(),
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            // Handled in the run loop.
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn enqueue(&mut self, text: String) {
        if !self.available || text.trim().is_empty() {
            return;
        }
        let voice = self.voice.snapshot();
        if !voice.enabled {
            return;
        }
        self.pending.push_back(SpeechChunk::new(text, &voice));
    }

    /// Start the next chunk when nothing is playing and no pause is held.
    fn start_next(&mut self) {
        if self.current.is_some() || self.resume_at.is_some() || !self.available {
            return;
        }
        let Some(chunk) = self.pending.pop_front() else {
            return;
        };

        tracing::trace!(text = %chunk.text, "Utterance started");
        let backend = Arc::clone(&self.backend);
        let spoken = chunk.clone();
        let utterance: Utterance = Box::pin(async move { backend.speak(&spoken).await });
        self.current = Some((utterance, chunk));
    }

    fn finish_utterance(&mut self, result: Result<(), NarrationError>) {
        let Some((_, chunk)) = self.current.take() else {
            return;
        };

        match result {
            Ok(()) => {
                self.spoken += 1;
                if !chunk.pause_after.is_zero() {
                    self.resume_at = Some(Instant::now() + chunk.pause_after);
                }
            }
            Err(NarrationError::Unavailable(reason)) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    %reason,
                    "Speech engine unavailable; narration disabled"
                );
                self.available = false;
                self.pending.clear();
                self.phrases.clear();
            }
            Err(NarrationError::Cancelled) => {}
            Err(e) => {
                self.failed += 1;
                tracing::warn!(error = %e, text = %chunk.text, "Utterance failed");
            }
        }
    }

    fn cancel_all(&mut self) {
        if let Some((_, chunk)) = self.current.take() {
            tracing::debug!(text = %chunk.text, "Utterance cancelled");
        }
        self.pending.clear();
        self.phrases.clear();
        self.resume_at = None;
    }

    fn status(&self) -> SpeechStatus {
        SpeechStatus {
            backend: self.backend.name().to_string(),
            pending: self.pending.len(),
            speaking: self.current.is_some(),
            pacing: self.resume_at.is_some(),
            spoken: self.spoken,
            failed: self.failed,
            available: self.available,
        }
    }
}

/// Resolve with the in-flight utterance's result; pend forever when idle.
async fn wait_current(
    current: &mut Option<(Utterance, SpeechChunk)>,
) -> Result<(), NarrationError> {
    match current {
        Some((utterance, _)) => utterance.as_mut().await,
        None => std::future::pending().await,
    }
}
