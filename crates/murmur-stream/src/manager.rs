//! Session manager actor.
//!
//! The manager owns at most one [`StreamSession`], the pause gate, the
//! continuous-mode restart timer and the generation history. It runs as a
//! single tokio task: commands from [`SessionManagerHandle`]s, messages from
//! the session reader and the restart deadline are all handled by one
//! `select!` loop, so no state is shared and every entry point re-checks its
//! guards against the state it actually sees.
//!
//! ```text
//!          start / timer              done                    settle delay
//!   Idle ───────────────▶ Session ───────────▶ commit ─▶ Idle ─────────────▶ start
//!                            │ error                       ▲
//!                            └──────────▶ discard ─────────┘
//! ```
//!
//! Restarts are scheduled only when continuous mode is on, the pause gate is
//! open, no `stop` is in effect and no session is active.

use std::sync::Arc;
use std::time::Duration;

use murmur_core::{
    ControllerEvent, ControllerSettings, Generation, GenerationTag, HistoryBuffer,
    InferenceTransport, LiveParams, NarrationPort, SessionId, SessionState, StreamRequest,
    TransportError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};

use crate::context::ContextPolicy;
use crate::session::{SessionMessage, SessionPayload, SessionUpdate, StreamSession};

// ── Configuration ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Delay between one session ending and the next starting.
    pub settle_delay: Duration,
    /// Whether sessions restart automatically.
    pub continuous: bool,
    pub history_capacity: usize,
    /// Base context of the first session.
    pub initial_context: String,
    pub context_policy: ContextPolicy,
}

impl ManagerConfig {
    #[must_use]
    pub fn from_settings(settings: &ControllerSettings) -> Self {
        Self {
            settle_delay: settings.settle_delay(),
            continuous: settings.continuous,
            history_capacity: settings.history_capacity,
            initial_context: settings.initial_context.clone(),
            context_policy: ContextPolicy::from_tail_chars(settings.context_tail_chars),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from_settings(&ControllerSettings::with_defaults())
    }
}

// ── Public types ───────────────────────────────────────────────────

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(SessionId),
    /// A session was already connecting or streaming; nothing changed.
    AlreadyActive(SessionId),
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    pub paused: bool,
    pub continuous: bool,
    /// `stop` was called and no `start`/resume has happened since.
    pub halted: bool,
    pub restart_pending: bool,
    pub history_len: usize,
    pub current_response: String,
    /// Context the next session will use.
    pub next_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("Session manager has shut down")]
    Closed,
}

// ── Commands ───────────────────────────────────────────────────────

enum Command {
    Start {
        context: Option<String>,
        reply: oneshot::Sender<StartOutcome>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    SetPaused {
        paused: bool,
        reply: oneshot::Sender<()>,
    },
    SetContinuous {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    SetContext {
        context: String,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<ManagerStatus>,
    },
    History {
        reply: oneshot::Sender<Vec<Generation>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ── Handle ─────────────────────────────────────────────────────────

/// Cloneable handle to a running manager.
///
/// When the last handle is dropped the manager stops its session and exits.
#[derive(Debug, Clone)]
pub struct SessionManagerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionManagerHandle {
    /// Start a session with the next context if none is active.
    pub async fn start(&self) -> Result<StartOutcome, ManagerError> {
        self.request(|reply| Command::Start {
            context: None,
            reply,
        })
        .await
    }

    /// Start a session with an explicit context if none is active.
    pub async fn start_with_context(
        &self,
        context: impl Into<String>,
    ) -> Result<StartOutcome, ManagerError> {
        let context = context.into();
        self.request(|reply| Command::Start {
            context: Some(context),
            reply,
        })
        .await
    }

    /// Close the active session, discard its output, cancel any pending
    /// restart and silence narration.
    pub async fn stop(&self) -> Result<(), ManagerError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Close or open the auto-restart gate. An active session is not touched.
    pub async fn set_paused(&self, paused: bool) -> Result<(), ManagerError> {
        self.request(|reply| Command::SetPaused { paused, reply })
            .await
    }

    pub async fn set_continuous(&self, enabled: bool) -> Result<(), ManagerError> {
        self.request(|reply| Command::SetContinuous { enabled, reply })
            .await
    }

    /// Replace the base context; the next session starts from it.
    pub async fn set_context(&self, context: impl Into<String>) -> Result<(), ManagerError> {
        let context = context.into();
        self.request(|reply| Command::SetContext { context, reply })
            .await
    }

    pub async fn status(&self) -> Result<ManagerStatus, ManagerError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Committed generations, most recent first.
    pub async fn history(&self) -> Result<Vec<Generation>, ManagerError> {
        self.request(|reply| Command::History { reply }).await
    }

    /// Stop and wait for the manager task to exit.
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| ManagerError::Closed)?;
        rx.await.map_err(|_| ManagerError::Closed)
    }
}

// ── Manager ────────────────────────────────────────────────────────

pub struct SessionManager {
    config: ManagerConfig,
    transport: Arc<dyn InferenceTransport>,
    params: LiveParams,
    narration: Arc<dyn NarrationPort>,
    events: mpsc::UnboundedSender<ControllerEvent>,
    session_tx: mpsc::UnboundedSender<SessionMessage>,
    session: Option<StreamSession>,
    history: HistoryBuffer,
    next_session_id: SessionId,
    next_tag: u64,
    paused: bool,
    halted: bool,
    continuous: bool,
    base_context: String,
    next_context: String,
    restart_at: Option<Instant>,
}

impl SessionManager {
    /// Spawn the manager task.
    ///
    /// Returns a handle and the receiver for [`ControllerEvent`]s. The event
    /// channel closes when the manager exits.
    pub fn spawn(
        config: ManagerConfig,
        transport: Arc<dyn InferenceTransport>,
        params: LiveParams,
        narration: Arc<dyn NarrationPort>,
    ) -> (SessionManagerHandle, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = mpsc::unbounded_channel();

        let manager = Self {
            history: HistoryBuffer::new(config.history_capacity),
            continuous: config.continuous,
            base_context: config.initial_context.clone(),
            next_context: config.initial_context.clone(),
            config,
            transport,
            params,
            narration,
            events: event_tx,
            session_tx,
            session: None,
            next_session_id: 1,
            next_tag: 0,
            paused: false,
            halted: false,
            restart_at: None,
        };

        tokio::spawn(manager.run(cmd_rx, session_rx));
        (SessionManagerHandle { tx: cmd_tx }, event_rx)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut session_rx: mpsc::UnboundedReceiver<SessionMessage>,
    ) {
        tracing::debug!(continuous = self.continuous, "Session manager started");

        loop {
            let restart_at = self.restart_at;
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.stop();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::debug!("All manager handles dropped");
                        self.stop();
                        break;
                    }
                },

                Some(message) = session_rx.recv() => self.handle_session_message(message),

                () = sleep_until(restart_at.unwrap_or_else(Instant::now)), if restart_at.is_some() => {
                    self.restart_at = None;
                    self.fire_restart();
                }
            }
        }

        tracing::debug!("Session manager exited");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { context, reply } => {
                let outcome = self.start(context);
                let _ = reply.send(outcome);
            }
            Command::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
            Command::SetPaused { paused, reply } => {
                self.set_paused(paused);
                let _ = reply.send(());
            }
            Command::SetContinuous { enabled, reply } => {
                self.set_continuous(enabled);
                let _ = reply.send(());
            }
            Command::SetContext { context, reply } => {
                self.set_context(context);
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::History { reply } => {
                let _ = reply.send(self.history.snapshot());
            }
            // Handled in the run loop.
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    // ── Commands ───────────────────────────────────────────────────

    fn start(&mut self, context: Option<String>) -> StartOutcome {
        if let Some(session) = self.session.as_ref().filter(|s| s.is_connected()) {
            tracing::debug!(session_id = session.id(), "Start ignored; session already active");
            return StartOutcome::AlreadyActive(session.id());
        }

        self.halted = false;
        self.cancel_restart();
        let context = context.unwrap_or_else(|| self.next_context.clone());
        StartOutcome::Started(self.begin_session(context))
    }

    fn stop(&mut self) {
        self.halted = true;
        self.cancel_restart();

        if let Some(mut session) = self.session.take() {
            let session_id = session.id();
            let partial_chars = session.partial_chars();
            session.close();
            tracing::info!(session_id, partial_chars, "Session stopped");
            self.emit(ControllerEvent::Discarded {
                session_id,
                reason: "stopped".to_string(),
                partial_chars,
            });
            self.emit(ControllerEvent::StateChanged {
                session_id,
                state: SessionState::Idle,
            });
        }

        self.narration.cancel_all();
    }

    fn set_paused(&mut self, paused: bool) {
        if paused == self.paused {
            return;
        }
        self.paused = paused;
        tracing::info!(paused, "Pause gate changed");
        self.emit(ControllerEvent::PauseChanged { paused });

        if paused {
            self.cancel_restart();
        } else {
            self.halted = false;
            self.schedule_restart();
        }
    }

    fn set_continuous(&mut self, enabled: bool) {
        if enabled == self.continuous {
            return;
        }
        self.continuous = enabled;
        tracing::info!(enabled, "Continuous mode changed");
        if enabled {
            self.schedule_restart();
        } else {
            self.cancel_restart();
        }
    }

    fn set_context(&mut self, context: String) {
        self.base_context.clone_from(&context);
        self.next_context.clone_from(&context);
        self.emit(ControllerEvent::ContextChanged { context });
    }

    fn status(&self) -> ManagerStatus {
        ManagerStatus {
            state: self
                .session
                .as_ref()
                .map_or(SessionState::Idle, StreamSession::state),
            session_id: self.session.as_ref().map(StreamSession::id),
            paused: self.paused,
            continuous: self.continuous,
            halted: self.halted,
            restart_pending: self.restart_at.is_some(),
            history_len: self.history.len(),
            current_response: self
                .session
                .as_ref()
                .map(|s| s.current_response().to_string())
                .unwrap_or_default(),
            next_context: self.next_context.clone(),
        }
    }

    // ── Session lifecycle ──────────────────────────────────────────

    fn begin_session(&mut self, context: String) -> SessionId {
        let session_id = self.next_session_id;
        self.next_session_id += 1;

        // Snapshot now; later edits reach the next session, never this one.
        let request = StreamRequest::new(context, self.params.snapshot());
        let mut session = StreamSession::new(session_id, request);

        self.narration.begin_generation(session_id);
        session.open(Arc::clone(&self.transport), self.session_tx.clone());
        let state = session.state();
        self.session = Some(session);

        self.emit(ControllerEvent::StateChanged { session_id, state });
        session_id
    }

    fn handle_session_message(&mut self, message: SessionMessage) {
        let Some(session) = self.session.as_mut() else {
            tracing::trace!(session_id = message.session_id, "Message for closed session");
            return;
        };
        if session.id() != message.session_id {
            tracing::debug!(
                session_id = message.session_id,
                active = session.id(),
                "Ignoring message from stale session"
            );
            return;
        }

        match message.payload {
            SessionPayload::Event(event) => self.apply_event(event),
            SessionPayload::Malformed(error) => {
                self.note_inbound();
                tracing::warn!(session_id = message.session_id, error = %error, "Dropped malformed event");
                self.emit(ControllerEvent::EventDropped {
                    session_id: message.session_id,
                    reason: error.to_string(),
                });
            }
            SessionPayload::Failed(error) => self.fail_session(&error),
        }
    }

    fn note_inbound(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.note_inbound() {
            let session_id = session.id();
            self.emit(ControllerEvent::StateChanged {
                session_id,
                state: SessionState::Streaming,
            });
        }
    }

    fn apply_event(&mut self, event: murmur_core::StreamEvent) {
        self.note_inbound();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let session_id = session.id();

        let delta = match session.apply(event) {
            SessionUpdate::Text { delta } => delta,
            SessionUpdate::Token { token, delta } => {
                self.emit(ControllerEvent::TokenReceived { session_id, token });
                delta
            }
            SessionUpdate::Completed => {
                self.complete_session();
                return;
            }
            SessionUpdate::Ignored => return,
        };

        // Repeats of output the other channel already delivered change nothing.
        let Some(delta) = delta else {
            return;
        };
        let response = self
            .session
            .as_ref()
            .map(|s| s.current_response().to_string())
            .unwrap_or_default();
        if !delta.is_empty() {
            self.narration.submit(session_id, &delta);
        }
        self.emit(ControllerEvent::ResponseUpdated {
            session_id,
            delta,
            response,
        });
    }

    fn complete_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let session_id = session.id();
        self.emit(ControllerEvent::StateChanged {
            session_id,
            state: SessionState::Completed,
        });

        let tag = GenerationTag::new(self.next_tag);
        self.next_tag += 1;
        let generation = session.into_generation(tag);

        self.narration.finish_generation(session_id);
        self.next_context = self
            .config
            .context_policy
            .next_context(&self.base_context, &generation.text());

        if let Some(evicted) = self.history.commit(generation.clone()) {
            tracing::debug!(evicted = %evicted.id(), "History full; evicted oldest generation");
        }
        tracing::info!(
            session_id,
            tag = tag.index,
            chars = generation.text().chars().count(),
            "Generation committed"
        );

        self.emit(ControllerEvent::Committed {
            generation: Box::new(generation),
        });
        self.emit(ControllerEvent::StateChanged {
            session_id,
            state: SessionState::Idle,
        });
        self.schedule_restart();
    }

    fn fail_session(&mut self, error: &TransportError) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let session_id = session.id();
        let partial_chars = session.partial_chars();
        session.fail(error);
        drop(session);

        self.narration.cancel_all();
        self.emit(ControllerEvent::StateChanged {
            session_id,
            state: SessionState::Errored,
        });
        self.emit(ControllerEvent::Discarded {
            session_id,
            reason: error.to_string(),
            partial_chars,
        });
        self.emit(ControllerEvent::StateChanged {
            session_id,
            state: SessionState::Idle,
        });
        self.schedule_restart();
    }

    // ── Restart scheduling ─────────────────────────────────────────

    const fn restart_allowed(&self) -> bool {
        self.continuous && !self.paused && !self.halted && self.session.is_none()
    }

    fn schedule_restart(&mut self) {
        if !self.restart_allowed() || self.restart_at.is_some() {
            return;
        }
        let delay = self.config.settle_delay;
        self.restart_at = Some(Instant::now() + delay);

        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(delay_ms, "Restart scheduled");
        self.emit(ControllerEvent::RestartScheduled { delay_ms });
    }

    fn cancel_restart(&mut self) {
        if self.restart_at.take().is_some() {
            tracing::debug!("Pending restart cancelled");
        }
    }

    fn fire_restart(&mut self) {
        if !self.restart_allowed() {
            tracing::debug!("Restart timer fired but restart no longer allowed");
            return;
        }
        let context = self.next_context.clone();
        self.begin_session(context);
    }

    /// Best-effort event emission.
    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }
}
