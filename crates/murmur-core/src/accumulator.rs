//! Per-generation fragment accumulation.
//!
//! A [`TokenAccumulator`] lives exactly as long as one stream session. The
//! server may send the same output twice: as plain text deltas and as
//! structured tokens. The first non-empty fragment fixes the display mode.
//! Both channels are kept; the text channel is the ground truth for the
//! current response once any text has arrived, and the token channel only
//! leads while it agrees with the text seen so far.

use serde::{Deserialize, Serialize};

use crate::domain::{GenerationContent, Token};

/// How the current generation is being displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Nothing accepted yet.
    #[default]
    Pending,
    /// Plain text deltas.
    Text,
    /// Structured tokens with probabilities.
    Tokens,
}

#[derive(Debug, Default)]
pub struct TokenAccumulator {
    mode: DisplayMode,
    text: String,
    token_text: String,
    tokens: Vec<Token>,
    response: String,
    fragments: usize,
}

impl TokenAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Append a plain text delta.
    ///
    /// Returns the newly visible tail of the response, or `None` when the
    /// response did not change. An empty delta does not fix the display mode.
    pub fn push_text(&mut self, delta: &str) -> Option<String> {
        if delta.is_empty() {
            return None;
        }
        self.settle(DisplayMode::Text);
        self.text.push_str(delta);
        self.fragments += 1;
        self.refresh()
    }

    /// Append a structured token.
    ///
    /// When the text channel already carries the same output the token is
    /// kept for display only and `None` is returned.
    pub fn push_token(&mut self, token: Token) -> Option<String> {
        self.settle(DisplayMode::Tokens);
        self.token_text.push_str(&token.text);
        self.tokens.push(token);
        self.fragments += 1;
        self.refresh()
    }

    const fn settle(&mut self, kind: DisplayMode) {
        if matches!(self.mode, DisplayMode::Pending) {
            self.mode = kind;
        }
    }

    fn authoritative(&self) -> &str {
        if self.text.is_empty() {
            return &self.token_text;
        }
        let tokens_lead =
            self.token_text.len() > self.text.len() && self.token_text.starts_with(&self.text);
        if tokens_lead { &self.token_text } else { &self.text }
    }

    fn refresh(&mut self) -> Option<String> {
        let next = self.authoritative();
        if next == self.response {
            return None;
        }
        let next = next.to_string();
        let shared = common_prefix_len(&self.response, &next);
        let delta = next[shared..].to_string();
        self.response = next;
        Some(delta)
    }

    /// The generation so far.
    pub fn current_response(&self) -> &str {
        &self.response
    }

    pub const fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.response.is_empty() && self.tokens.is_empty()
    }

    /// Consume the accumulator into committed content.
    ///
    /// Tokens are committed only when they spell the final response; any
    /// divergence falls back to the text channel.
    pub fn into_content(self) -> GenerationContent {
        let tokens_complete = !self.tokens.is_empty() && self.token_text == self.response;
        match self.mode {
            DisplayMode::Tokens if tokens_complete => GenerationContent::Tokens(self.tokens),
            _ => GenerationContent::Text(self.response),
        }
    }
}

/// Byte length of the longest shared prefix, on a char boundary.
fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map_or_else(|| a.len().min(b.len()), |((i, _), _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str) -> Token {
        Token {
            text: text.to_string(),
            id: 0,
            probability: 0.5,
            top5: Vec::new(),
        }
    }

    #[test]
    fn test_text_deltas_concatenate_in_order() {
        let mut acc = TokenAccumulator::new();
        assert_eq!(acc.push_text("He").as_deref(), Some("He"));
        assert_eq!(acc.current_response(), "He");
        assert_eq!(acc.push_text("llo").as_deref(), Some("llo"));
        assert_eq!(acc.current_response(), "Hello");
        assert_eq!(acc.mode(), DisplayMode::Text);
        assert_eq!(acc.into_content(), GenerationContent::Text("Hello".into()));
    }

    #[test]
    fn test_dual_channel_is_not_counted_twice() {
        let mut acc = TokenAccumulator::new();
        assert_eq!(acc.push_token(token("He")).as_deref(), Some("He"));
        assert_eq!(acc.push_text("He"), None);
        assert_eq!(acc.push_token(token("llo")).as_deref(), Some("llo"));
        assert_eq!(acc.push_text("llo"), None);
        assert_eq!(acc.current_response(), "Hello");
        assert_eq!(acc.mode(), DisplayMode::Tokens);
        match acc.into_content() {
            GenerationContent::Tokens(tokens) => assert_eq!(tokens.len(), 2),
            GenerationContent::Text(text) => panic!("expected tokens, got {text:?}"),
        }
    }

    #[test]
    fn test_text_channel_fills_a_lost_token() {
        let mut acc = TokenAccumulator::new();
        acc.push_token(token("He"));
        acc.push_text("He");
        // The matching token never arrived.
        assert_eq!(acc.push_text("llo").as_deref(), Some("llo"));
        assert_eq!(acc.current_response(), "Hello");
        assert_eq!(acc.into_content(), GenerationContent::Text("Hello".into()));
    }

    #[test]
    fn test_text_wins_when_channels_disagree() {
        let mut acc = TokenAccumulator::new();
        acc.push_token(token("He"));
        acc.push_token(token("lp"));
        acc.push_text("He");
        assert_eq!(acc.current_response(), "Help");
        assert_eq!(acc.push_text("llo").as_deref(), Some("lo"));
        assert_eq!(acc.current_response(), "Hello");
    }

    #[test]
    fn test_empty_delta_does_not_fix_mode() {
        let mut acc = TokenAccumulator::new();
        assert_eq!(acc.push_text(""), None);
        assert_eq!(acc.mode(), DisplayMode::Pending);
        acc.push_token(token("x"));
        assert_eq!(acc.mode(), DisplayMode::Tokens);
        assert_eq!(acc.fragment_count(), 1);
        match acc.into_content() {
            GenerationContent::Tokens(tokens) => assert_eq!(tokens.len(), 1),
            GenerationContent::Text(_) => panic!("expected tokens"),
        }
    }

    #[test]
    fn test_common_prefix_respects_char_boundaries() {
        assert_eq!(common_prefix_len("héllo", "hélp"), 4);
        assert_eq!(common_prefix_len("ab", "abc"), 2);
        assert_eq!(common_prefix_len("", "x"), 0);
    }

    #[test]
    fn test_empty_accumulator_commits_empty_text() {
        let acc = TokenAccumulator::new();
        assert!(acc.is_empty());
        assert_eq!(acc.into_content(), GenerationContent::Text(String::new()));
    }
}
