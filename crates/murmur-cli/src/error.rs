//! CLI-specific error types and exit code mapping.

use murmur_core::{ControlError, ParamError, PushError, SettingsError};
use murmur_stream::{ClientBuildError, ManagerError};
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Argument parsing or validation error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// Configuration error (settings, environment, server URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The inference server could not be reached or refused a request.
    #[error("Server error: {0}")]
    Server(String),

    /// IO error on stdin/stdout.
    #[error("IO error: {0}")]
    Io(String),

    /// A background task ended unexpectedly.
    #[error("{0}")]
    Internal(String),
}

impl CliError {
    /// Map error to an exit code, following sysexits.h.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Config(_) => 78,   // EX_CONFIG
            Self::Server(_) => 69,   // EX_UNAVAILABLE
            Self::Io(_) => 74,       // EX_IOERR
            Self::Internal(_) => 1,
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<ClientBuildError> for CliError {
    fn from(err: ClientBuildError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<ParamError> for CliError {
    fn from(err: ParamError) -> Self {
        Self::Arguments(err.to_string())
    }
}

impl From<ControlError> for CliError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::ContextIndex { .. } => Self::Arguments(err.to_string()),
            other => Self::Server(other.to_string()),
        }
    }
}

impl From<PushError> for CliError {
    fn from(err: PushError) -> Self {
        match err {
            PushError::Param(e) => e.into(),
            PushError::Control(e) => e.into(),
        }
    }
}

impl From<ManagerError> for CliError {
    fn from(err: ManagerError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::from(SettingsError::EmptyContext).exit_code(), 78);
        assert_eq!(
            CliError::from(ParamError::UnknownParam("warmth".into())).exit_code(),
            2
        );
        assert_eq!(
            CliError::from(ControlError::Request("refused".into())).exit_code(),
            69
        );
    }

    #[test]
    fn test_context_index_is_a_usage_error() {
        let err = CliError::from(ControlError::ContextIndex {
            index: 9,
            available: 2,
        });
        assert!(matches!(err, CliError::Arguments(_)));
    }

    #[test]
    fn test_push_error_keeps_its_category() {
        let err = CliError::from(PushError::Control(ControlError::Status {
            status: 500,
            body: "boom".into(),
        }));
        assert!(matches!(err, CliError::Server(ref msg) if msg.contains("boom")));
    }
}
