#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]

pub mod accumulator;
pub mod domain;
pub mod events;
pub mod history;
pub mod ports;
pub mod services;
pub mod settings;

// Re-export commonly used types for convenience
pub use accumulator::{DisplayMode, TokenAccumulator};
pub use domain::{
    Generation, GenerationContent, GenerationTag, LiveParams, LiveVoiceParams, MirostatMode,
    Nudge, ParamError, ParamField, ParamRange, ParamsPatch, SamplingConfig, SpeechChunk,
    SpeechGranularity, Token, TokenCandidate, TokenError, VoiceParams,
};
pub use events::{ControllerEvent, SessionId, SessionState, StreamEvent};
pub use history::{DEFAULT_HISTORY_CAPACITY, HistoryBuffer};
pub use ports::{
    ContextList, ControlError, ControlPort, CurrentContext, EventStream, InferenceTransport,
    InjectRequest, MalformedEventError, NarrationError, NarrationPort, NoopNarration, PauseStatus,
    StreamError, StreamRequest, TransportError,
};
pub use services::{ParamsService, PushError};
pub use settings::{
    ControllerSettings, DEFAULT_CONTEXT_TAIL_CHARS, DEFAULT_INITIAL_CONTEXT,
    DEFAULT_SERVER_URL, DEFAULT_SETTLE_DELAY_MS, SettingsError, validate_settings,
};
