//! Narration port.
//!
//! The session manager drives narration through this trait and never waits
//! on it: every method is a non-blocking hand-off. Implementations own their
//! failure handling, so nothing here returns a result to the text pipeline.

use crate::events::SessionId;

/// Why narration could not happen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NarrationError {
    /// No usable speech engine. Narration is skipped from then on.
    #[error("Narration unavailable: {0}")]
    Unavailable(String),

    /// One utterance failed; later ones are still attempted.
    #[error("Utterance failed: {0}")]
    Failed(String),

    /// The utterance was cut short by a cancel.
    #[error("Utterance cancelled")]
    Cancelled,
}

/// Sink for streamed text to be spoken.
pub trait NarrationPort: Send + Sync {
    /// A new generation is starting. Anything still playing or queued from an
    /// earlier generation is cancelled.
    fn begin_generation(&self, session_id: SessionId);

    /// Queue a text chunk of the given generation.
    fn submit(&self, session_id: SessionId, text: &str);

    /// The generation finished normally; flush any buffered text but let
    /// queued speech play out.
    fn finish_generation(&self, session_id: SessionId);

    /// Drop everything playing or queued.
    fn cancel_all(&self);
}

/// Narration sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNarration;

impl NarrationPort for NoopNarration {
    fn begin_generation(&self, _session_id: SessionId) {}

    fn submit(&self, _session_id: SessionId, _text: &str) {}

    fn finish_generation(&self, _session_id: SessionId) {}

    fn cancel_all(&self) {}
}
