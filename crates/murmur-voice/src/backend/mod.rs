//! Speech engine backends.
//!
//! The [`SpeechQueue`](crate::queue::SpeechQueue) plays one
//! [`SpeechChunk`] at a time through a [`SpeechBackend`] trait object, so
//! engines can be swapped without touching the queue logic.
//!
//! | Backend | Engine |
//! |---------|--------|
//! | [`command`] | `espeak-ng`, `espeak`, `say` or `spd-say` found on `PATH` |
//! | [`log`] | none; logs each utterance and waits out its estimated length |

pub mod command;
pub mod log;

use std::sync::Arc;

use murmur_core::{NarrationError, SpeechChunk};

pub use command::{CommandSpeechBackend, SpeechProgram};
pub use log::LogSpeechBackend;

/// Backend-agnostic text-to-speech engine.
///
/// `speak` resolves when the utterance has finished playing. Dropping the
/// future must stop playback; that is how the queue cancels.
#[async_trait::async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Speak one chunk and wait for it to finish.
    ///
    /// Return [`NarrationError::Unavailable`] when the engine cannot be used
    /// at all; the queue then stops narrating. Any other error only skips
    /// this chunk.
    async fn speak(&self, chunk: &SpeechChunk) -> Result<(), NarrationError>;

    /// Short engine name for logs and status output.
    fn name(&self) -> &str;
}

/// Pick the best backend available on this machine.
///
/// Falls back to [`LogSpeechBackend`] when no speech command is installed.
pub fn detect_backend() -> Arc<dyn SpeechBackend> {
    match CommandSpeechBackend::detect() {
        Some(backend) => {
            tracing::info!(engine = backend.name(), "Using speech command");
            Arc::new(backend)
        }
        None => {
            tracing::warn!("No speech command found on PATH; narration will only be logged");
            Arc::new(LogSpeechBackend::new())
        }
    }
}
