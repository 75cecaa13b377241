//! `run` handler: stream generations while taking line commands on stdin.
//!
//! The session manager, the speech queue and a stdin reader thread run side
//! by side; this loop only renders events and turns lines into manager,
//! parameter, voice and control-endpoint calls.

use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use murmur_core::{
    ControlPort, ControllerEvent, ControllerSettings, LiveVoiceParams, NarrationPort,
    NoopNarration, ParamsService,
};
use murmur_stream::{ManagerConfig, SessionManager, SessionManagerHandle, StartOutcome};
use murmur_voice::{SpeechQueue, SpeechQueueHandle, detect_backend};
use tokio::sync::mpsc;

use crate::bootstrap::CliContext;
use crate::commands::RunArgs;
use crate::error::CliError;
use crate::handlers::contexts::{context_lines, select_context, server_context};
use crate::presentation::{
    EventFormat, Output, format_params, format_voice, history_table, render_event, status_lines,
    truncate_string,
};
use crate::repl::{HELP, ReplCommand, VoiceEdit};

const HISTORY_WIDTH: usize = 100;
const SPEECH_DRAIN_POLL: Duration = Duration::from_millis(100);

/// What the loop should do after a line command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Print these lines to stderr and keep going.
    Say(Vec<String>),
    Quit,
}

impl Reply {
    fn say(line: impl Into<String>) -> Self {
        Self::Say(vec![line.into()])
    }
}

/// Applies line commands to the running controller.
pub struct LineHandler<'a> {
    manager: &'a SessionManagerHandle,
    control: &'a dyn ControlPort,
    params: &'a ParamsService,
    voice: &'a LiveVoiceParams,
    speech: Option<&'a SpeechQueueHandle>,
}

impl<'a> LineHandler<'a> {
    pub const fn new(
        manager: &'a SessionManagerHandle,
        control: &'a dyn ControlPort,
        params: &'a ParamsService,
        voice: &'a LiveVoiceParams,
        speech: Option<&'a SpeechQueueHandle>,
    ) -> Self {
        Self {
            manager,
            control,
            params,
            voice,
            speech,
        }
    }

    /// Parse and apply one line. Bad input is reported, never fatal.
    pub async fn handle(&self, line: &str) -> Result<Reply, CliError> {
        match ReplCommand::parse(line) {
            Ok(Some(command)) => self.apply(command).await,
            Ok(None) => Ok(Reply::Say(Vec::new())),
            Err(e) => Ok(Reply::say(e.to_string())),
        }
    }

    pub async fn apply(&self, command: ReplCommand) -> Result<Reply, CliError> {
        let reply = match command {
            ReplCommand::Set(patch) => match self.params.apply(&patch) {
                Ok(config) => Reply::say(format_params(&config)),
                Err(e) => Reply::say(e.to_string()),
            },
            ReplCommand::Nudge(field, direction) => match self.params.nudge(field, direction) {
                Ok(_) => Reply::say(format_params(&self.params.live().snapshot())),
                Err(e) => Reply::say(e.to_string()),
            },
            ReplCommand::Voice(edit) => {
                let voice = self.voice.update(|v| match edit {
                    VoiceEdit::Speed(speed) => v.speed = speed,
                    VoiceEdit::Pitch(pitch) => v.pitch = pitch,
                    VoiceEdit::Tempo(tempo) => v.tempo = tempo,
                    VoiceEdit::Enabled(enabled) => v.enabled = enabled,
                });
                if !voice.enabled {
                    if let Some(speech) = self.speech {
                        speech.cancel_all();
                    }
                }
                Reply::say(format_voice(&voice))
            }
            ReplCommand::Pause => {
                self.manager.set_paused(true).await?;
                Reply::Say(Vec::new())
            }
            ReplCommand::Resume => {
                self.manager.set_paused(false).await?;
                let status = self.manager.status().await?;
                if status.halted {
                    self.start().await?
                } else {
                    Reply::Say(Vec::new())
                }
            }
            ReplCommand::Continuous(enabled) => {
                self.manager.set_continuous(enabled).await?;
                Reply::say(if enabled {
                    "[continuous on]"
                } else {
                    "[continuous off; `start` for the next generation]"
                })
            }
            ReplCommand::Start(None) => self.start().await?,
            ReplCommand::Start(Some(context)) => {
                let outcome = self.manager.start_with_context(context).await?;
                Self::started(outcome)
            }
            ReplCommand::Stop => {
                self.manager.stop().await?;
                Reply::say("[stopped; `start` or `resume` to continue]")
            }
            ReplCommand::Contexts => match self.control.contexts().await {
                Ok(list) => Reply::Say(context_lines(&list)),
                Err(e) => Reply::say(format!("Failed to fetch contexts: {e}")),
            },
            ReplCommand::Context(index) => match select_context(self.control, index).await {
                Ok(current) => {
                    let shown = truncate_string(&current.current, 60);
                    self.manager.set_context(current.current).await?;
                    Reply::say(format!("[context set for the next generation: {shown}]"))
                }
                Err(e) => Reply::say(format!("Failed to select context {index}: {e}")),
            },
            ReplCommand::Inject(text) => match self.control.inject_tokens(&text).await {
                Ok(()) => Reply::say(format!("[injected {} chars]", text.chars().count())),
                Err(e) => Reply::say(format!("Failed to inject text: {e}")),
            },
            ReplCommand::History => {
                let history = self.manager.history().await?;
                Reply::say(history_table(&history, HISTORY_WIDTH))
            }
            ReplCommand::Status => {
                let status = self.manager.status().await?;
                let speech = match self.speech {
                    Some(queue) => queue.status().await.ok(),
                    None => None,
                };
                Reply::Say(status_lines(
                    &status,
                    &self.params.live().snapshot(),
                    &self.voice.snapshot(),
                    speech.as_ref(),
                ))
            }
            ReplCommand::Help => Reply::say(HELP),
            ReplCommand::Quit => Reply::Quit,
        };
        Ok(reply)
    }

    async fn start(&self) -> Result<Reply, CliError> {
        Ok(Self::started(self.manager.start().await?))
    }

    fn started(outcome: StartOutcome) -> Reply {
        match outcome {
            StartOutcome::Started(id) => Reply::say(format!("[session {id} started]")),
            StartOutcome::AlreadyActive(id) => {
                Reply::say(format!("[session {id} is already streaming]"))
            }
        }
    }
}

/// Manager settings for `run`.
///
/// Unless a context was configured, the first generation starts from the
/// server's current context.
pub async fn manager_config(
    settings: &ControllerSettings,
    control: &dyn ControlPort,
    context_configured: bool,
) -> ManagerConfig {
    let mut config = ManagerConfig::from_settings(settings);
    if !context_configured {
        if let Some(current) = server_context(control).await {
            tracing::debug!(chars = current.chars().count(), "Starting from server context");
            config.initial_context = current;
        }
    }
    config
}

/// Execute the run command.
///
/// `context_configured` is true when `--context` or the environment chose
/// the first context.
pub async fn execute(ctx: &CliContext, args: &RunArgs, context_configured: bool) -> Result<()> {
    let settings = ctx.settings();
    let control: &dyn ControlPort = ctx.control.as_ref();

    let speech = settings.narration.then(|| {
        let backend = detect_backend();
        tracing::info!(backend = backend.name(), "Narration enabled");
        SpeechQueue::spawn(backend, ctx.voice.clone(), settings.speech_granularity)
    });
    let narration: Arc<dyn NarrationPort> = match &speech {
        Some(queue) => Arc::new(queue.clone()),
        None => Arc::new(NoopNarration),
    };

    let config = manager_config(settings, control, context_configured).await;
    let (manager, mut events) = SessionManager::spawn(
        config,
        ctx.transport.clone(),
        ctx.live_params().clone(),
        narration,
    );
    let handler = LineHandler::new(&manager, control, &ctx.params, &ctx.voice, speech.as_ref());
    let format = if args.json {
        EventFormat::Json
    } else {
        EventFormat::Text
    };

    let mut lines = spawn_stdin_reader();
    if format == EventFormat::Text && std::io::stdin().is_terminal() {
        eprintln!(
            "Streaming from {}. Type `help` for commands.",
            settings.server_url
        );
    }

    manager.start().await.map_err(CliError::from)?;
    let outcome = drive(&handler, &mut events, &mut lines, format, args.once).await;

    if args.once && outcome.is_ok() {
        if let Some(queue) = &speech {
            drain_speech(queue).await;
        }
    }
    if manager.shutdown().await.is_err() {
        tracing::debug!("Session manager already stopped");
    }
    if let Some(queue) = speech {
        if queue.shutdown().await.is_err() {
            tracing::debug!("Speech queue already stopped");
        }
    }

    outcome
}

async fn drive(
    handler: &LineHandler<'_>,
    events: &mut mpsc::UnboundedReceiver<ControllerEvent>,
    lines: &mut mpsc::UnboundedReceiver<String>,
    format: EventFormat,
    once: bool,
) -> Result<()> {
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                write_event(&mut stdout, &event, format).map_err(CliError::from)?;
                if once && ends_generation(&event) {
                    break;
                }
            }
            Some(line) = lines.recv() => {
                match handler.handle(&line).await? {
                    Reply::Say(output) => {
                        for line in output {
                            eprintln!("{line}");
                        }
                    }
                    Reply::Quit => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                break;
            }
        }
    }

    Ok(())
}

const fn ends_generation(event: &ControllerEvent) -> bool {
    matches!(
        event,
        ControllerEvent::Committed { .. } | ControllerEvent::Discarded { .. }
    )
}

fn write_event(
    out: &mut impl Write,
    event: &ControllerEvent,
    format: EventFormat,
) -> std::io::Result<()> {
    match render_event(event, format) {
        Some(Output::Stdout(text)) => {
            out.write_all(text.as_bytes())?;
            out.flush()
        }
        Some(Output::Stderr(line)) => {
            eprintln!("{line}");
            Ok(())
        }
        None => Ok(()),
    }
}

/// Read stdin lines on a plain thread so a blocked read never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("murmur-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Failed to start stdin reader; line commands disabled");
    }
    rx
}

/// Wait until the speech queue has nothing left to say, or Ctrl-C.
async fn drain_speech(queue: &SpeechQueueHandle) {
    loop {
        match queue.status().await {
            Ok(status) if status.pending > 0 || status.speaking => {}
            _ => return,
        }
        tokio::select! {
            () = tokio::time::sleep(SPEECH_DRAIN_POLL) => {}
            _ = tokio::signal::ctrl_c() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use murmur_core::{SessionState, TransportError};

    use super::*;

    #[test]
    fn test_only_terminal_events_end_a_generation() {
        assert!(ends_generation(&ControllerEvent::Discarded {
            session_id: 1,
            reason: TransportError::EndedWithoutDone.to_string(),
            partial_chars: 0,
        }));
        assert!(!ends_generation(&ControllerEvent::StateChanged {
            session_id: 1,
            state: SessionState::Completed,
        }));
    }

    #[test]
    fn test_write_event_flushes_text() {
        let mut out = Vec::new();
        let event = ControllerEvent::ResponseUpdated {
            session_id: 1,
            delta: "He".into(),
            response: "He".into(),
        };
        write_event(&mut out, &event, EventFormat::Text).unwrap();
        write_event(&mut out, &event, EventFormat::Json).unwrap();

        let written = String::from_utf8(out).unwrap();
        assert!(written.starts_with("He{\"type\":\"response_updated\""));
        assert!(written.ends_with("}\n"));
    }
}
