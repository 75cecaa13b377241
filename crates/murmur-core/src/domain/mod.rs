//! Core domain types.
//!
//! Pure value types with no I/O.
//!
//! # Structure
//!
//! - `sampling` - Sampling parameters, patches and the shared live state
//! - `token` - Per-token payloads from `token_data` events
//! - `generation` - Committed generations and their display tags
//! - `speech` - Voice controls and narration chunks

pub mod generation;
pub mod sampling;
pub mod speech;
pub mod token;

pub use generation::{Generation, GenerationContent, GenerationTag};
pub use sampling::{
    LiveParams, MirostatMode, Nudge, ParamError, ParamField, ParamRange, ParamsPatch,
    SamplingConfig,
};
pub use speech::{LiveVoiceParams, MAX_PAUSE_MS, SpeechChunk, SpeechGranularity, VoiceParams};
pub use token::{TOP_CANDIDATES, Token, TokenCandidate, TokenError};
