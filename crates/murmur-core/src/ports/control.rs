//! Control endpoint port.
//!
//! The inference server exposes a handful of side endpoints besides the
//! stream: parameter updates, a server-side pause toggle, a list of canned
//! contexts and text injection. These are collaborator calls; failures are reported to
//! the caller and never touch the stream pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ParamsPatch;

/// Response of `GET /toggle-pause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseStatus {
    pub is_paused: bool,
}

/// Response of `GET /contexts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextList {
    pub contexts: Vec<String>,
    pub current: String,
}

impl ContextList {
    /// Index of the current context in the list, if present.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.contexts.iter().position(|c| *c == self.current)
    }
}

/// Response of `POST /set-context`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentContext {
    pub current: String,
}

/// Body of `POST /inject-tokens`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectRequest {
    pub text: String,
}

/// Errors from control endpoint calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("Control request failed: {0}")]
    Request(String),

    #[error("Control endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected control response: {0}")]
    Decode(String),

    #[error("Context index {index} out of range ({available} available)")]
    ContextIndex { index: usize, available: usize },
}

/// Client for the inference server's control endpoints.
#[async_trait]
pub trait ControlPort: Send + Sync {
    /// `POST /update-params` with a partial patch.
    async fn update_params(&self, patch: &ParamsPatch) -> Result<(), ControlError>;

    /// `GET /toggle-pause`.
    async fn toggle_pause(&self) -> Result<PauseStatus, ControlError>;

    /// `GET /contexts`.
    async fn contexts(&self) -> Result<ContextList, ControlError>;

    /// `POST /set-context?context_index=N`.
    async fn set_context(&self, index: usize) -> Result<CurrentContext, ControlError>;

    /// `POST /inject-tokens` with `{"text": ...}`.
    ///
    /// Asks the server to splice text into the running generation. The
    /// stream is untouched here; anything injected arrives as ordinary
    /// fragments.
    async fn inject_tokens(&self, text: &str) -> Result<(), ControlError>;
}
