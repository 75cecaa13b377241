//! Phrase assembly for `phrase` granularity narration.
//!
//! Streamed deltas are often a single token long, which a synthesizer reads
//! with odd prosody. The assembler buffers deltas and releases a phrase when
//! it sees a sentence end (`.`, `!`, `?` followed by whitespace), a line
//! break, or a clause break (`,`, `;`, `:`) once the phrase is long enough.
//! A terminator at the very end of the buffer is held until the next delta,
//! so `3.` followed by `14` stays one number.

/// Clause punctuation only ends a phrase after this many characters.
const MIN_CLAUSE_CHARS: usize = 40;

/// Phrases without any boundary are cut at whitespace past this length.
const MAX_PHRASE_CHARS: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct PhraseAssembler {
    buffer: String,
}

impl PhraseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return every phrase it completed.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        let mut phrases = Vec::new();

        loop {
            let end = find_boundary(&self.buffer).or_else(|| find_overflow_cut(&self.buffer));
            let Some(end) = end else {
                break;
            };
            let phrase = self.buffer[..end].trim().to_string();
            let rest = self.buffer[end..].trim_start().to_string();
            self.buffer = rest;
            if !phrase.is_empty() {
                phrases.push(phrase);
            }
        }

        phrases
    }

    /// Release whatever is buffered, if it has any speakable text.
    pub fn flush(&mut self) -> Option<String> {
        let phrase = std::mem::take(&mut self.buffer);
        let phrase = phrase.trim();
        (!phrase.is_empty()).then(|| phrase.to_string())
    }

    /// Drop buffered text without speaking it.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

/// Byte offset just past the first phrase boundary.
fn find_boundary(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();
    let mut seen = 0usize;

    while let Some((i, c)) = chars.next() {
        seen += 1;
        let end = i + c.len_utf8();
        if c == '\n' {
            return Some(end);
        }
        let Some(&(_, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }
        match c {
            '.' | '!' | '?' => return Some(end),
            ',' | ';' | ':' if seen >= MIN_CLAUSE_CHARS => return Some(end),
            _ => {}
        }
    }

    None
}

/// Cut point for a phrase that ran past the length cap with no boundary.
fn find_overflow_cut(text: &str) -> Option<usize> {
    let (cap, _) = text.char_indices().nth(MAX_PHRASE_CHARS)?;
    let head = &text[..cap];
    match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => Some(space),
        _ => Some(cap),
    }
}
