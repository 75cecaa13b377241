//! Narration voice settings and the unit of work handed to a speech engine.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Longest inter-utterance pause, reached at `tempo = 0.0`.
pub const MAX_PAUSE_MS: u64 = 1500;

/// How streamed text is cut into utterances.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SpeechGranularity {
    /// Every inbound chunk is one utterance.
    #[default]
    Delta,
    /// Chunks are buffered into sentence or clause sized phrases.
    Phrase,
}

/// Client-side voice controls for narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    /// Whether streamed text is narrated at all.
    pub enabled: bool,
    /// Speaking rate multiplier, `0.5..=2.0`.
    pub speed: f32,
    /// Pitch multiplier, `0.0..=2.0`.
    pub pitch: f32,
    /// `0.0` leaves the longest gap between utterances, `1.0` none.
    pub tempo: f32,
    /// Engine-specific voice name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            enabled: true,
            speed: 1.0,
            pitch: 1.0,
            tempo: 0.5,
            voice: None,
        }
    }
}

impl VoiceParams {
    /// Copy with every numeric control clamped to its valid range.
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            enabled: self.enabled,
            speed: clamp_or(self.speed, 0.5, 2.0, 1.0),
            pitch: clamp_or(self.pitch, 0.0, 2.0, 1.0),
            tempo: clamp_or(self.tempo, 0.0, 1.0, 0.5),
            voice: self.voice.clone(),
        }
    }

    /// Silence inserted after each utterance: `(1 - tempo) * 1500ms`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn pause_after(&self) -> Duration {
        let tempo = f64::from(clamp_or(self.tempo, 0.0, 1.0, 0.5));
        Duration::from_millis(((1.0 - tempo) * MAX_PAUSE_MS as f64).round() as u64)
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// One utterance queued for narration.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechChunk {
    pub text: String,
    pub speed: f32,
    pub pitch: f32,
    pub voice: Option<String>,
    /// Silence to hold after this chunk before starting the next.
    pub pause_after: Duration,
}

impl SpeechChunk {
    /// Bind text to the voice settings in effect when it was queued.
    #[must_use]
    pub fn new(text: impl Into<String>, params: &VoiceParams) -> Self {
        let params = params.clamped();
        Self {
            text: text.into(),
            speed: params.speed,
            pitch: params.pitch,
            pause_after: params.pause_after(),
            voice: params.voice,
        }
    }
}

/// Voice settings shared between the UI and the narration queue.
#[derive(Debug, Clone, Default)]
pub struct LiveVoiceParams {
    inner: Arc<RwLock<VoiceParams>>,
}

impl LiveVoiceParams {
    #[must_use]
    pub fn new(initial: VoiceParams) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial.clamped())),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> VoiceParams {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Edit in place; values are clamped afterwards.
    pub fn update(&self, edit: impl FnOnce(&mut VoiceParams)) -> VoiceParams {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        edit(&mut guard);
        *guard = guard.clamped();
        guard.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_scales_with_tempo() {
        let mut params = VoiceParams::default();
        params.tempo = 0.0;
        assert_eq!(params.pause_after(), Duration::from_millis(1500));
        params.tempo = 1.0;
        assert_eq!(params.pause_after(), Duration::ZERO);
        params.tempo = 0.5;
        assert_eq!(params.pause_after(), Duration::from_millis(750));
    }

    #[test]
    fn test_chunk_captures_clamped_params() {
        let params = VoiceParams {
            speed: 5.0,
            pitch: -1.0,
            ..VoiceParams::default()
        };
        let chunk = SpeechChunk::new("hi", &params);
        assert!((chunk.speed - 2.0).abs() < f32::EPSILON);
        assert!(chunk.pitch.abs() < f32::EPSILON);
    }

    #[test]
    fn test_live_voice_update_clamps() {
        let live = LiveVoiceParams::default();
        let updated = live.update(|v| v.tempo = 3.0);
        assert!((updated.tempo - 1.0).abs() < f32::EPSILON);
        assert_eq!(live.snapshot(), updated);
    }
}
