//! Controller settings and validation.
//!
//! Settings are plain values with documented defaults. The CLI overlays them
//! from the environment (see [`ControllerSettings::overlay_env`]) and then
//! from command-line flags, and validates the result once before wiring
//! anything up.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::SpeechGranularity;
use crate::history::DEFAULT_HISTORY_CAPACITY;

/// Default inference server base URL.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Default delay between one session ending and the next starting.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Default number of trailing output characters carried into the next
/// session's context.
pub const DEFAULT_CONTEXT_TAIL_CHARS: usize = 1000;

/// Prompt used when no context has been chosen.
pub const DEFAULT_INITIAL_CONTEXT: &str =
    "Explain in plain language how to reverse a string programmatically.";

const MAX_SETTLE_DELAY_MS: u64 = 60_000;
const MAX_HISTORY_CAPACITY: usize = 1_000;

/// Environment variable names read by [`ControllerSettings::overlay_env`].
pub mod env_vars {
    pub const SERVER_URL: &str = "MURMUR_SERVER_URL";
    pub const SETTLE_DELAY_MS: &str = "MURMUR_SETTLE_DELAY_MS";
    pub const HISTORY_CAPACITY: &str = "MURMUR_HISTORY_CAPACITY";
    pub const CONTEXT_TAIL_CHARS: &str = "MURMUR_CONTEXT_TAIL_CHARS";
    pub const INITIAL_CONTEXT: &str = "MURMUR_INITIAL_CONTEXT";
    pub const NARRATION: &str = "MURMUR_NARRATION";
    pub const SPEECH_GRANULARITY: &str = "MURMUR_SPEECH_GRANULARITY";
}

/// Settings for one controller instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Base URL of the inference server.
    pub server_url: String,

    /// Settle delay before an automatic restart, in milliseconds.
    pub settle_delay_ms: u64,

    /// Number of committed generations kept in memory.
    pub history_capacity: usize,

    /// Whether finished or failed sessions are followed by a new one.
    pub continuous: bool,

    /// Trailing characters of the last output used as the next context.
    /// `0` keeps the base context for every session.
    pub context_tail_chars: usize,

    /// Context of the first session.
    pub initial_context: String,

    /// Whether streamed text is narrated.
    pub narration: bool,

    /// How narration splits text into utterances.
    pub speech_granularity: SpeechGranularity,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ControllerSettings {
    /// Create settings with the documented defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            continuous: true,
            context_tail_chars: DEFAULT_CONTEXT_TAIL_CHARS,
            initial_context: DEFAULT_INITIAL_CONTEXT.to_string(),
            narration: true,
            speech_granularity: SpeechGranularity::Delta,
        }
    }

    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Overlay values from the process environment.
    pub fn overlay_env(&mut self) -> Result<(), SettingsError> {
        self.overlay_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary lookup. Unset keys are left alone.
    pub fn overlay_from<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(env_vars::SERVER_URL) {
            self.server_url = url;
        }
        if let Some(raw) = lookup(env_vars::SETTLE_DELAY_MS) {
            self.settle_delay_ms = parse_env(env_vars::SETTLE_DELAY_MS, &raw)?;
        }
        if let Some(raw) = lookup(env_vars::HISTORY_CAPACITY) {
            self.history_capacity = parse_env(env_vars::HISTORY_CAPACITY, &raw)?;
        }
        if let Some(raw) = lookup(env_vars::CONTEXT_TAIL_CHARS) {
            self.context_tail_chars = parse_env(env_vars::CONTEXT_TAIL_CHARS, &raw)?;
        }
        if let Some(context) = lookup(env_vars::INITIAL_CONTEXT) {
            self.initial_context = context;
        }
        if let Some(raw) = lookup(env_vars::NARRATION) {
            self.narration = parse_bool(env_vars::NARRATION, &raw)?;
        }
        if let Some(raw) = lookup(env_vars::SPEECH_GRANULARITY) {
            self.speech_granularity = parse_env(env_vars::SPEECH_GRANULARITY, &raw)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, SettingsError> {
    raw.trim().parse().map_err(|_| SettingsError::InvalidEnv {
        var,
        value: raw.to_string(),
    })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, SettingsError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidEnv {
            var,
            value: raw.to_string(),
        }),
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Server URL must start with http:// or https://, got {0:?}")]
    InvalidServerUrl(String),

    #[error("Settle delay must be at most 60000 ms, got {0}")]
    InvalidSettleDelay(u64),

    #[error("History capacity must be between 1 and 1000, got {0}")]
    InvalidHistoryCapacity(usize),

    #[error("Initial context cannot be empty")]
    EmptyContext,

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Validate settings values.
pub fn validate_settings(settings: &ControllerSettings) -> Result<(), SettingsError> {
    let url = settings.server_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(SettingsError::InvalidServerUrl(settings.server_url.clone()));
    }

    if settings.settle_delay_ms > MAX_SETTLE_DELAY_MS {
        return Err(SettingsError::InvalidSettleDelay(settings.settle_delay_ms));
    }

    if !(1..=MAX_HISTORY_CAPACITY).contains(&settings.history_capacity) {
        return Err(SettingsError::InvalidHistoryCapacity(
            settings.history_capacity,
        ));
    }

    if settings.initial_context.trim().is_empty() {
        return Err(SettingsError::EmptyContext);
    }

    Ok(())
}
