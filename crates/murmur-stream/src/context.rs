//! How the next session's context is chosen in continuous mode.

/// Context carry-over policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPolicy {
    /// Every session starts from the base context.
    Fixed,
    /// The next session continues from the tail of the last committed output.
    ContinueFromOutput { tail_chars: usize },
}

impl ContextPolicy {
    /// `0` means [`Fixed`](Self::Fixed).
    #[must_use]
    pub const fn from_tail_chars(tail_chars: usize) -> Self {
        if tail_chars == 0 {
            Self::Fixed
        } else {
            Self::ContinueFromOutput { tail_chars }
        }
    }

    /// Context for the session after one that produced `output`.
    ///
    /// An empty or whitespace-only output falls back to `base`.
    #[must_use]
    pub fn next_context(&self, base: &str, output: &str) -> String {
        match *self {
            Self::Fixed => base.to_string(),
            Self::ContinueFromOutput { .. } if output.trim().is_empty() => base.to_string(),
            Self::ContinueFromOutput { tail_chars } => tail(output, tail_chars).to_string(),
        }
    }
}

/// Last `max_chars` characters of `text`, cut on a char boundary.
fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    text.char_indices()
        .nth(skip)
        .map_or(text, |(offset, _)| &text[offset..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_keeps_tail() {
        let policy = ContextPolicy::ContinueFromOutput { tail_chars: 5 };
        assert_eq!(policy.next_context("base", "Hello world"), "world");
        assert_eq!(policy.next_context("base", "Hi"), "Hi");
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let policy = ContextPolicy::ContinueFromOutput { tail_chars: 3 };
        assert_eq!(policy.next_context("base", "na\u{ef}ve caf\u{e9}"), "af\u{e9}");
    }

    #[test]
    fn test_fixed_and_empty_output_use_base() {
        assert_eq!(ContextPolicy::Fixed.next_context("base", "output"), "base");
        let policy = ContextPolicy::from_tail_chars(1000);
        assert_eq!(policy.next_context("base", "  \n"), "base");
        assert_eq!(ContextPolicy::from_tail_chars(0), ContextPolicy::Fixed);
    }
}
