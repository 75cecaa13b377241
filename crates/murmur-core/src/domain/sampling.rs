//! Sampling parameter domain types.
//!
//! [`SamplingConfig`] is the immutable per-session snapshot sent to the
//! inference endpoint. [`LiveParams`] is the shared, mutable parameter state
//! that the client edits between (and during) generations; sessions never
//! read it directly, they take a [`LiveParams::snapshot`] at start time.

use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

// ── Errors ─────────────────────────────────────────────────────────

/// Errors raised while validating or applying parameter changes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("Unknown parameter: {0}")]
    UnknownParam(String),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: ParamField,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: ParamField, value: String },

    #[error("Mirostat mode must be 0, 1 or 2, got {0}")]
    InvalidMirostatMode(u8),

    #[error("{0} is not numeric and cannot be nudged")]
    NotNumeric(ParamField),
}

// ── Mirostat ───────────────────────────────────────────────────────

/// Mirostat adaptive sampling mode.
///
/// Serialized as the bare integer the inference server expects (`0`, `1`, `2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MirostatMode {
    /// Plain top-k / top-p truncation.
    #[default]
    Disabled,
    /// Mirostat v1.
    V1,
    /// Mirostat v2.
    V2,
}

impl MirostatMode {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }

    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl TryFrom<u8> for MirostatMode {
    type Error = ParamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(ParamError::InvalidMirostatMode(other)),
        }
    }
}

impl From<MirostatMode> for u8 {
    fn from(mode: MirostatMode) -> Self {
        mode.as_u8()
    }
}

// ── Parameter catalogue ────────────────────────────────────────────

/// Every tunable field of [`SamplingConfig`], named as on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ParamField {
    Temperature,
    TopP,
    TopK,
    NumPredict,
    RepeatPenalty,
    PresencePenalty,
    FrequencyPenalty,
    MirostatMode,
    MirostatTau,
    MirostatEta,
    HotWord,
    HotWordBoost,
}

/// Inclusive range and nudge step for a numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParamRange {
    const fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

impl ParamField {
    /// Valid range for numeric fields; `None` for `hot_word`.
    #[must_use]
    pub const fn range(self) -> Option<ParamRange> {
        let range = match self {
            Self::Temperature => ParamRange::new(0.0, 2.0, 0.1),
            Self::TopP => ParamRange::new(0.0, 1.0, 0.1),
            Self::TopK => ParamRange::new(1.0, 100.0, 5.0),
            Self::NumPredict => ParamRange::new(4.0, 4096.0, 4.0),
            Self::RepeatPenalty => ParamRange::new(0.0, 2.0, 0.05),
            Self::PresencePenalty | Self::FrequencyPenalty => ParamRange::new(-2.0, 2.0, 0.1),
            Self::MirostatMode => ParamRange::new(0.0, 2.0, 1.0),
            Self::MirostatTau => ParamRange::new(0.0, 10.0, 0.5),
            Self::MirostatEta => ParamRange::new(0.0, 1.0, 0.01),
            Self::HotWordBoost => ParamRange::new(0.0, 10.0, 0.5),
            Self::HotWord => return None,
        };
        Some(range)
    }

    /// Whether the field only takes integer values.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::TopK | Self::NumPredict | Self::MirostatMode)
    }

    fn check(self, value: f64) -> Result<f64, ParamError> {
        let Some(range) = self.range() else {
            return Err(ParamError::NotNumeric(self));
        };
        if !range.contains(value) {
            return Err(ParamError::OutOfRange {
                field: self,
                value,
                min: range.min,
                max: range.max,
            });
        }
        Ok(value)
    }
}

/// Direction of a keyboard-style parameter nudge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nudge {
    Up,
    Down,
}

// ── SamplingConfig ─────────────────────────────────────────────────

/// Generation parameters sent with one streaming request.
///
/// When `mirostat_mode` is enabled the server ignores `top_p`/`top_k`, but
/// the values are still carried so toggling mirostat off restores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub num_predict: u32,
    pub repeat_penalty: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub mirostat_mode: MirostatMode,
    pub mirostat_tau: f32,
    pub mirostat_eta: f32,
    pub hot_word: String,
    pub hot_word_boost: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            top_p: 0.4,
            top_k: 30,
            num_predict: 48,
            repeat_penalty: 1.1,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            mirostat_mode: MirostatMode::Disabled,
            mirostat_tau: 5.0,
            mirostat_eta: 0.1,
            hot_word: String::new(),
            hot_word_boost: 0.0,
        }
    }
}

impl SamplingConfig {
    /// Whether top-k / top-p truncation is in effect server-side.
    #[must_use]
    pub const fn truncation_active(&self) -> bool {
        !self.mirostat_mode.is_enabled()
    }

    /// Every field as a `(name, value)` pair, in wire order.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("temperature", self.temperature.to_string()),
            ("top_p", self.top_p.to_string()),
            ("top_k", self.top_k.to_string()),
            ("num_predict", self.num_predict.to_string()),
            ("repeat_penalty", self.repeat_penalty.to_string()),
            ("presence_penalty", self.presence_penalty.to_string()),
            ("frequency_penalty", self.frequency_penalty.to_string()),
            ("mirostat_mode", self.mirostat_mode.as_u8().to_string()),
            ("mirostat_tau", self.mirostat_tau.to_string()),
            ("mirostat_eta", self.mirostat_eta.to_string()),
            ("hot_word", self.hot_word.clone()),
            ("hot_word_boost", self.hot_word_boost.to_string()),
        ]
    }

    /// Current value of a numeric field.
    #[must_use]
    pub fn numeric(&self, field: ParamField) -> Option<f64> {
        let value = match field {
            ParamField::Temperature => f64::from(self.temperature),
            ParamField::TopP => f64::from(self.top_p),
            ParamField::TopK => f64::from(self.top_k),
            ParamField::NumPredict => f64::from(self.num_predict),
            ParamField::RepeatPenalty => f64::from(self.repeat_penalty),
            ParamField::PresencePenalty => f64::from(self.presence_penalty),
            ParamField::FrequencyPenalty => f64::from(self.frequency_penalty),
            ParamField::MirostatMode => f64::from(self.mirostat_mode.as_u8()),
            ParamField::MirostatTau => f64::from(self.mirostat_tau),
            ParamField::MirostatEta => f64::from(self.mirostat_eta),
            ParamField::HotWordBoost => f64::from(self.hot_word_boost),
            ParamField::HotWord => return None,
        };
        Some(value)
    }

    /// Apply a partial update. Every field is validated before any is written,
    /// so a rejected patch leaves the config untouched.
    pub fn apply(&mut self, patch: &ParamsPatch) -> Result<(), ParamError> {
        patch.validate()?;
        let mut next = self.clone();
        next.merge_unchecked(patch);
        *self = next;
        Ok(())
    }

    /// Step a numeric field up or down by its configured step, clamped to range.
    ///
    /// Returns the new value.
    pub fn nudge(&mut self, field: ParamField, direction: Nudge) -> Result<f64, ParamError> {
        let range = field.range().ok_or(ParamError::NotNumeric(field))?;
        let current = self.numeric(field).ok_or(ParamError::NotNumeric(field))?;
        let delta = match direction {
            Nudge::Up => range.step,
            Nudge::Down => -range.step,
        };
        // Round to the step grid so repeated 0.1 nudges don't drift.
        let stepped = ((current + delta) / range.step).round() * range.step;
        let next = range.clamp(stepped);
        self.apply(&ParamsPatch::single_numeric(field, next)?)?;
        Ok(self.numeric(field).unwrap_or(next))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn merge_unchecked(&mut self, patch: &ParamsPatch) {
        if let Some(v) = patch.temperature {
            self.temperature = v;
        }
        if let Some(v) = patch.top_p {
            self.top_p = v;
        }
        if let Some(v) = patch.top_k {
            self.top_k = v;
        }
        if let Some(v) = patch.num_predict {
            self.num_predict = v;
        }
        if let Some(v) = patch.repeat_penalty {
            self.repeat_penalty = v;
        }
        if let Some(v) = patch.presence_penalty {
            self.presence_penalty = v;
        }
        if let Some(v) = patch.frequency_penalty {
            self.frequency_penalty = v;
        }
        if let Some(v) = patch.mirostat_mode {
            self.mirostat_mode = v;
        }
        if let Some(v) = patch.mirostat_tau {
            self.mirostat_tau = v;
        }
        if let Some(v) = patch.mirostat_eta {
            self.mirostat_eta = v;
        }
        if let Some(ref v) = patch.hot_word {
            self.hot_word.clone_from(v);
        }
        if let Some(v) = patch.hot_word_boost {
            self.hot_word_boost = v;
        }
    }
}

// ── ParamsPatch ────────────────────────────────────────────────────

/// Partial parameter update.
///
/// This is also the JSON body of `POST /update-params`: only the fields that
/// are `Some` are serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirostat_mode: Option<MirostatMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirostat_tau: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirostat_eta: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hot_word: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hot_word_boost: Option<f32>,
}

impl ParamsPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Build a single-field patch from textual input (`"top_k"`, `"40"`).
    pub fn parse_field(name: &str, value: &str) -> Result<Self, ParamError> {
        let field =
            ParamField::from_str(name).map_err(|_| ParamError::UnknownParam(name.to_string()))?;
        if field == ParamField::HotWord {
            return Ok(Self {
                hot_word: Some(value.to_string()),
                ..Self::default()
            });
        }
        let parsed: f64 = value.trim().parse().map_err(|_| ParamError::InvalidValue {
            field,
            value: value.to_string(),
        })?;
        if field.is_integer() && parsed.fract() != 0.0 {
            return Err(ParamError::InvalidValue {
                field,
                value: value.to_string(),
            });
        }
        Self::single_numeric(field, parsed)
    }

    /// Parse a `name=value` assignment.
    pub fn parse_assignment(assignment: &str) -> Result<Self, ParamError> {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| ParamError::UnknownParam(assignment.to_string()))?;
        Self::parse_field(name.trim(), value)
    }

    /// Combine two patches; fields set in `other` win.
    #[must_use]
    pub fn merged(mut self, other: Self) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            temperature,
            top_p,
            top_k,
            num_predict,
            repeat_penalty,
            presence_penalty,
            frequency_penalty,
            mirostat_mode,
            mirostat_tau,
            mirostat_eta,
            hot_word,
            hot_word_boost
        );
        self
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn single_numeric(field: ParamField, value: f64) -> Result<Self, ParamError> {
        let value = field.check(value)?;
        let mut patch = Self::default();
        match field {
            ParamField::Temperature => patch.temperature = Some(value as f32),
            ParamField::TopP => patch.top_p = Some(value as f32),
            ParamField::TopK => patch.top_k = Some(value.round() as u32),
            ParamField::NumPredict => patch.num_predict = Some(value.round() as u32),
            ParamField::RepeatPenalty => patch.repeat_penalty = Some(value as f32),
            ParamField::PresencePenalty => patch.presence_penalty = Some(value as f32),
            ParamField::FrequencyPenalty => patch.frequency_penalty = Some(value as f32),
            ParamField::MirostatMode => {
                patch.mirostat_mode = Some(MirostatMode::try_from(value.round() as u8)?);
            }
            ParamField::MirostatTau => patch.mirostat_tau = Some(value as f32),
            ParamField::MirostatEta => patch.mirostat_eta = Some(value as f32),
            ParamField::HotWordBoost => patch.hot_word_boost = Some(value as f32),
            ParamField::HotWord => return Err(ParamError::NotNumeric(field)),
        }
        Ok(patch)
    }

    /// Validate every set field against its range.
    pub fn validate(&self) -> Result<(), ParamError> {
        let numeric = [
            (ParamField::Temperature, self.temperature.map(f64::from)),
            (ParamField::TopP, self.top_p.map(f64::from)),
            (ParamField::TopK, self.top_k.map(f64::from)),
            (ParamField::NumPredict, self.num_predict.map(f64::from)),
            (ParamField::RepeatPenalty, self.repeat_penalty.map(f64::from)),
            (ParamField::PresencePenalty, self.presence_penalty.map(f64::from)),
            (ParamField::FrequencyPenalty, self.frequency_penalty.map(f64::from)),
            (ParamField::MirostatTau, self.mirostat_tau.map(f64::from)),
            (ParamField::MirostatEta, self.mirostat_eta.map(f64::from)),
            (ParamField::HotWordBoost, self.hot_word_boost.map(f64::from)),
        ];
        for (field, value) in numeric {
            if let Some(value) = value {
                field.check(value)?;
            }
        }
        Ok(())
    }
}

// ── LiveParams ─────────────────────────────────────────────────────

/// Shared, mutable parameter state edited by the client.
///
/// Cloning shares the same underlying state. Readers that need a stable view
/// must call [`snapshot`](Self::snapshot); the returned config is detached
/// from later edits.
#[derive(Debug, Clone, Default)]
pub struct LiveParams {
    inner: Arc<RwLock<SamplingConfig>>,
}

impl LiveParams {
    #[must_use]
    pub fn new(initial: SamplingConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Copy of the current values.
    #[must_use]
    pub fn snapshot(&self) -> SamplingConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply a validated patch and return the resulting snapshot.
    pub fn apply(&self, patch: &ParamsPatch) -> Result<SamplingConfig, ParamError> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.apply(patch)?;
        Ok(guard.clone())
    }

    /// Nudge a numeric field; returns the new value.
    pub fn nudge(&self, field: ParamField, direction: Nudge) -> Result<f64, ParamError> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.nudge(field, direction)
    }
}
