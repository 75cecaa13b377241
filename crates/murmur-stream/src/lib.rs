#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]

pub mod context;
pub mod control;
pub mod decode;
pub mod http;
pub mod manager;
pub mod session;
pub mod sse;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use context::ContextPolicy;
pub use control::HttpControlClient;
pub use decode::decode_frame;
pub use http::{ClientBuildError, HttpTransport, sse_event_stream};
pub use manager::{
    ManagerConfig, ManagerError, ManagerStatus, SessionManager, SessionManagerHandle,
    StartOutcome,
};
pub use session::{SessionMessage, SessionPayload, SessionUpdate, StreamSession};
pub use sse::{SseDecoder, SseFrame};
