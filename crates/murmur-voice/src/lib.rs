#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]

pub mod backend;
pub mod phrases;
pub mod queue;

pub use backend::{
    CommandSpeechBackend, LogSpeechBackend, SpeechBackend, SpeechProgram, detect_backend,
};
pub use phrases::PhraseAssembler;
pub use queue::{QueueClosed, SpeechQueue, SpeechQueueHandle, SpeechStatus};
