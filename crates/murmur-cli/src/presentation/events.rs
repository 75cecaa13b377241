//! Controller events as terminal output.
//!
//! Generated text goes to stdout; everything else is a notice on stderr, so
//! `murmur run > story.txt` captures only the generations.

use murmur_core::ControllerEvent;

/// How `run` prints controller events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFormat {
    /// Deltas as plain text, notices on stderr.
    #[default]
    Text,
    /// One JSON object per event on stdout.
    Json,
}

/// Where a rendered event goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Written without a trailing newline.
    Stdout(String),
    /// Written as one line.
    Stderr(String),
}

/// Render one event. `None` means the event is not shown in this format.
pub fn render_event(event: &ControllerEvent, format: EventFormat) -> Option<Output> {
    match format {
        EventFormat::Json => match serde_json::to_string(event) {
            Ok(line) => Some(Output::Stdout(format!("{line}\n"))),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize event");
                None
            }
        },
        EventFormat::Text => render_text(event),
    }
}

fn render_text(event: &ControllerEvent) -> Option<Output> {
    match event {
        ControllerEvent::ResponseUpdated { delta, .. } => Some(Output::Stdout(delta.clone())),
        ControllerEvent::Committed { .. } => Some(Output::Stdout("\n\n".to_string())),
        ControllerEvent::Discarded {
            reason,
            partial_chars,
            ..
        } => Some(Output::Stderr(if *partial_chars > 0 {
            format!("\n[discarded {partial_chars} chars: {reason}]")
        } else {
            format!("[generation failed: {reason}]")
        })),
        ControllerEvent::PauseChanged { paused: true } => {
            Some(Output::Stderr("[paused]".to_string()))
        }
        ControllerEvent::PauseChanged { paused: false } => {
            Some(Output::Stderr("[resumed]".to_string()))
        }
        ControllerEvent::StateChanged { .. }
        | ControllerEvent::TokenReceived { .. }
        | ControllerEvent::EventDropped { .. }
        | ControllerEvent::RestartScheduled { .. }
        | ControllerEvent::ContextChanged { .. } => None,
    }
}
