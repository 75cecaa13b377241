//! Speech through a platform command-line synthesizer.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use murmur_core::{NarrationError, SpeechChunk};
use strum_macros::Display;
use tokio::process::Command;

/// Base speaking rate at `speed = 1.0`.
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Supported synthesizers, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SpeechProgram {
    EspeakNg,
    Espeak,
    Say,
    SpdSay,
}

impl SpeechProgram {
    pub const ALL: [Self; 4] = [Self::EspeakNg, Self::Espeak, Self::Say, Self::SpdSay];

    /// Executable name looked up on `PATH`.
    pub const fn binary(self) -> &'static str {
        match self {
            Self::EspeakNg => "espeak-ng",
            Self::Espeak => "espeak",
            Self::Say => "say",
            Self::SpdSay => "spd-say",
        }
    }

    /// Arguments that speak `chunk` and block until playback ends.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn args(self, chunk: &SpeechChunk) -> Vec<String> {
        let speed = chunk.speed.clamp(0.5, 2.0);
        let pitch = chunk.pitch.clamp(0.0, 2.0);
        let wpm = (BASE_WORDS_PER_MINUTE * speed).round() as u32;

        let mut args = Vec::with_capacity(8);
        match self {
            Self::EspeakNg | Self::Espeak => {
                // espeak pitch runs 0..=99 with 50 as the default.
                let pitch = ((pitch * 50.0).round() as u32).min(99);
                args.extend(["-s".to_string(), wpm.to_string()]);
                args.extend(["-p".to_string(), pitch.to_string()]);
                if let Some(voice) = &chunk.voice {
                    args.extend(["-v".to_string(), voice.clone()]);
                }
            }
            Self::Say => {
                args.extend(["-r".to_string(), wpm.to_string()]);
                if let Some(voice) = &chunk.voice {
                    args.extend(["-v".to_string(), voice.clone()]);
                }
            }
            Self::SpdSay => {
                // spd-say rate and pitch run -100..=100 around 0.
                let rate = ((speed - 1.0) * 100.0).round() as i32;
                let pitch = ((pitch - 1.0) * 100.0).round() as i32;
                args.push("-w".to_string());
                args.extend(["-r".to_string(), rate.clamp(-100, 100).to_string()]);
                args.extend(["-p".to_string(), pitch.clamp(-100, 100).to_string()]);
                if let Some(voice) = &chunk.voice {
                    args.extend(["-y".to_string(), voice.clone()]);
                }
            }
        }
        args.push(spoken_text(&chunk.text));
        args
    }
}

/// Keep text that starts with `-` from being read as a flag.
fn spoken_text(text: &str) -> String {
    let text = text.trim();
    if text.starts_with('-') {
        format!(" {text}")
    } else {
        text.to_string()
    }
}

/// Speaks by running one synthesizer process per chunk.
///
/// The child is spawned with `kill_on_drop`, so cancelling the `speak`
/// future silences it immediately.
#[derive(Debug, Clone)]
pub struct CommandSpeechBackend {
    program: SpeechProgram,
    path: PathBuf,
}

impl CommandSpeechBackend {
    pub fn new(program: SpeechProgram, path: impl Into<PathBuf>) -> Self {
        Self {
            program,
            path: path.into(),
        }
    }

    /// First supported synthesizer found on `PATH`.
    pub fn detect() -> Option<Self> {
        SpeechProgram::ALL.into_iter().find_map(|program| {
            which::which(program.binary())
                .ok()
                .map(|path| Self::new(program, path))
        })
    }

    pub const fn program(&self) -> SpeechProgram {
        self.program
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn spawn_error(&self, e: &io::Error) -> NarrationError {
        let message = format!("{}: {e}", self.path.display());
        match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                NarrationError::Unavailable(message)
            }
            _ => NarrationError::Failed(message),
        }
    }
}

#[async_trait::async_trait]
impl super::SpeechBackend for CommandSpeechBackend {
    async fn speak(&self, chunk: &SpeechChunk) -> Result<(), NarrationError> {
        let mut child = Command::new(&self.path)
            .args(self.program.args(chunk))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(&e))?;

        let status = child
            .wait()
            .await
            .map_err(|e| NarrationError::Failed(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(NarrationError::Failed(format!(
                "{} exited with {status}",
                self.program.binary()
            )))
        }
    }

    fn name(&self) -> &str {
        self.program.binary()
    }
}
