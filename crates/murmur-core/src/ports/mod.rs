//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the controller expects from infrastructure.
//! They use only domain types.
//!
//! # Design Rules
//!
//! - No reqwest, SSE or process types in any signature
//! - Narration is fire-and-forget: the text pipeline never awaits it
//! - Transport errors are typed so the manager can tell terminal failures
//!   from droppable events

pub mod control;
pub mod inference;
pub mod narration;

pub use control::{
    ContextList, ControlError, ControlPort, CurrentContext, InjectRequest, PauseStatus,
};
pub use inference::{
    EventStream, InferenceTransport, MalformedEventError, StreamError, StreamRequest,
    TransportError,
};
pub use narration::{NarrationError, NarrationPort, NoopNarration};
