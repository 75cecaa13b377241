//! Log-only backend for machines without a synthesizer.

use std::time::Duration;

use murmur_core::{NarrationError, SpeechChunk};

const MIN_UTTERANCE_MS: u64 = 1000;
const MS_PER_CHAR: u64 = 200;

/// Logs each chunk and sleeps for roughly as long as speaking it would take.
///
/// Keeps the queue's pacing observable without audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSpeechBackend;

impl LogSpeechBackend {
    pub const fn new() -> Self {
        Self
    }

    /// `max(1s, 200ms per char)`, divided by the speed multiplier.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn estimated_duration(chunk: &SpeechChunk) -> Duration {
        let chars = chunk.text.chars().count() as u64;
        let base = (chars * MS_PER_CHAR).max(MIN_UTTERANCE_MS);
        let speed = f64::from(chunk.speed.clamp(0.5, 2.0));
        Duration::from_millis((base as f64 / speed).round() as u64)
    }
}

#[async_trait::async_trait]
impl super::SpeechBackend for LogSpeechBackend {
    async fn speak(&self, chunk: &SpeechChunk) -> Result<(), NarrationError> {
        let duration = Self::estimated_duration(chunk);
        tracing::debug!(
            text = %chunk.text,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "Speaking"
        );
        tokio::time::sleep(duration).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
