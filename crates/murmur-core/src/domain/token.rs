//! Per-token stream payloads.

use serde::{Deserialize, Serialize};

/// Maximum number of alternative candidates kept per token.
pub const TOP_CANDIDATES: usize = 5;

/// One alternative the sampler considered for a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCandidate {
    pub text: String,
    pub id: i64,
    #[serde(rename = "prob")]
    pub probability: f32,
}

/// A sampled token together with its probability and the top alternatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub id: i64,
    #[serde(rename = "prob")]
    pub probability: f32,
    #[serde(default)]
    pub top5: Vec<TokenCandidate>,
}

/// Why a `token_data` payload was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenError {
    #[error("Token payload is not valid JSON: {0}")]
    Json(String),

    #[error("Probability {0} is outside 0..=1")]
    Probability(f32),
}

impl Token {
    /// Parse and validate a `token_data` event payload.
    ///
    /// Candidate lists longer than five are truncated; the server may
    /// send candidates in any order.
    pub fn from_json(payload: &str) -> Result<Self, TokenError> {
        let mut token: Self =
            serde_json::from_str(payload).map_err(|e| TokenError::Json(e.to_string()))?;
        check_probability(token.probability)?;
        for candidate in &token.top5 {
            check_probability(candidate.probability)?;
        }
        token.top5.truncate(TOP_CANDIDATES);
        Ok(token)
    }
}

fn check_probability(p: f32) -> Result<(), TokenError> {
    if p.is_finite() && (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(TokenError::Probability(p))
    }
}
