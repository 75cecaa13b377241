//! Committed generations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sampling::SamplingConfig;
use super::token::Token;

/// The body of a generation, in whichever display mode it streamed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "data", rename_all = "snake_case")]
pub enum GenerationContent {
    Text(String),
    Tokens(Vec<Token>),
}

impl GenerationContent {
    /// Concatenated output text.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Tokens(tokens) => tokens.iter().map(|t| t.text.as_str()).collect(),
        }
    }
}

/// Display tag for a generation: an ordinal plus a hue derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTag {
    pub index: u64,
    /// Degrees on the colour wheel, `0..360`.
    pub hue: u16,
}

impl GenerationTag {
    /// Golden-angle spacing keeps neighbouring tags visually distinct.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(index: u64) -> Self {
        Self {
            index,
            hue: ((index.wrapping_mul(137)) % 360) as u16,
        }
    }
}

/// A finished generation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    id: Uuid,
    tag: GenerationTag,
    context: String,
    params: SamplingConfig,
    content: GenerationContent,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl Generation {
    #[must_use]
    pub fn new(
        tag: GenerationTag,
        context: String,
        params: SamplingConfig,
        content: GenerationContent,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag,
            context,
            params,
            content,
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub const fn tag(&self) -> GenerationTag {
        self.tag
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// The sampling snapshot this generation was produced with.
    pub const fn params(&self) -> &SamplingConfig {
        &self.params
    }

    pub const fn content(&self) -> &GenerationContent {
        &self.content
    }

    pub fn text(&self) -> String {
        self.content.text()
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub const fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}
