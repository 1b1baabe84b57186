//! Splits cleaned text into utterances the backend accepts.
//!
//! Pieces are cut at sentence and clause punctuation (Latin and CJK), then
//! packed greedily into utterances of at most `max_len` characters. Anything
//! that still does not fit is hard-sliced on character boundaries. Pause
//! directives are never split, so an SSML `<break/>` in the input reaches
//! the synthesis markup intact.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Inline SSML pause, attribute in single or double quotes, self-closing slash optional.
pub(crate) static PAUSE_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<break\s+time\s*=\s*(?:"[^"<>]*"|'[^'<>]*')\s*/?>"#).unwrap()
});

/// One bounded piece of text submitted as a single synthesis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utterance {
    /// Zero-based position in the request
    pub index: usize,
    pub text: String,
}

impl Utterance {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Length in characters, the unit `max_len` is measured in.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

fn is_boundary(ch: char) -> bool {
    matches!(
        ch,
        '.' | '?'
            | '!'
            | ','
            | ';'
            | ':'
            | '\n'
            | '。'
            | '？'
            | '！'
            | '，'
            | '；'
            | '：'
            | '、'
    )
}

/// Split at boundary characters, each boundary character being a piece of its own.
fn split_at_boundaries<'a>(text: &'a str, pieces: &mut Vec<&'a str>) {
    let mut start = 0;

    for (pos, ch) in text.char_indices() {
        if is_boundary(ch) {
            if start < pos {
                pieces.push(&text[start..pos]);
            }
            let end = pos + ch.len_utf8();
            pieces.push(&text[pos..end]);
            start = end;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
}

/// Split into pieces; a pause directive is always one whole piece.
fn split_pieces(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut last = 0;

    for directive in PAUSE_DIRECTIVE.find_iter(text) {
        split_at_boundaries(&text[last..directive.start()], &mut pieces);
        pieces.push(directive.as_str());
        last = directive.end();
    }
    split_at_boundaries(&text[last..], &mut pieces);

    pieces
}

fn slice_chars(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_len)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect()
}

fn flush(buffer: &mut String, max_len: usize, out: &mut Vec<String>) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        if trimmed.chars().count() <= max_len {
            out.push(trimmed.to_string());
        } else {
            out.extend(
                slice_chars(trimmed, max_len)
                    .into_iter()
                    .map(|s| s.trim().to_string()),
            );
        }
    }
    buffer.clear();
}

/// Segment `text` into utterances no longer than `max_len` characters.
///
/// Empty or whitespace-only text yields no utterances. `max_len` must be
/// positive; callers validate it before getting here.
pub fn segment(text: &str, max_len: usize) -> Vec<Utterance> {
    let max_len = max_len.max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0usize;

    for piece in split_pieces(text) {
        let piece_len = piece.chars().count();

        if buffer_len + piece_len <= max_len {
            if buffer.is_empty() {
                let piece = piece.trim_start();
                buffer_len = piece.chars().count();
                buffer.push_str(piece);
            } else {
                buffer.push_str(piece);
                buffer_len += piece_len;
            }
            continue;
        }

        flush(&mut buffer, max_len, &mut chunks);
        let piece = piece.trim_start();
        buffer.push_str(piece);
        buffer_len = piece.chars().count();
    }
    flush(&mut buffer, max_len, &mut chunks);

    if chunks.is_empty() && !text.trim().is_empty() {
        chunks = slice_chars(text.trim(), max_len);
    }

    chunks
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .enumerate()
        .map(|(index, text)| Utterance { index, text })
        .collect()
}
