//! Deterministic splitting of document content into ordered segments.
//!
//! Content is cut on blank-line paragraph boundaries first. Paragraphs are
//! accumulated into a segment until the token budget would overflow, at which
//! point the accumulated text is flushed and the incoming paragraph starts
//! the next segment. A paragraph too large for the budget on its own is
//! split on sentence boundaries, and sentences that still exceed the budget
//! are hard-sliced on character windows so no segment can exceed the limit.

use dossier_core::error::{DossierError, Result};

/// Rough chars-per-token ratio used by the estimator.
const CHARS_PER_TOKEN: usize = 4;

/// A single ordered piece of a document, ready to become a chunk row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub content: String,
    pub token_count: u32,
}

/// Estimates the token count of `text` as `ceil(chars / 4)`.
///
/// The estimate is intentionally cheap and deterministic; the same text always
/// yields the same count.
pub fn estimate_tokens(text: &str) -> u32 {
    text.chars().count().div_ceil(CHARS_PER_TOKEN) as u32
}

/// Splits `content` into ordered segments, each within `max_tokens`.
///
/// Whitespace-only input produces no segments. Segment content is trimmed and
/// the recorded token count is the estimate of the trimmed text.
pub fn chunk(content: &str, max_tokens: u32) -> Result<Vec<Segment>> {
    if max_tokens == 0 {
        return Err(DossierError::Validation(
            "max_tokens_per_chunk must be at least 1".to_string(),
        ));
    }

    let mut segments = Vec::new();
    let mut current = String::new();

    for paragraph in content.split("\n\n") {
        if paragraph.trim().is_empty() {
            continue;
        }

        let candidate = if current.is_empty() {
            paragraph.to_string()
        } else {
            format!("{}\n\n{}", current, paragraph)
        };

        if estimate_tokens(&candidate) > max_tokens {
            if !current.is_empty() {
                push_segment(&mut segments, &current);
                current.clear();
            }
            if estimate_tokens(paragraph) <= max_tokens {
                // The paragraph fits the budget by itself, so it begins the
                // next segment intact.
                current = paragraph.to_string();
            } else {
                // Too large even alone, split into sentences and emit each
                // as its own segment.
                for sentence in paragraph.split('.') {
                    for piece in enforce_limit(sentence, max_tokens) {
                        push_segment(&mut segments, &piece);
                    }
                }
            }
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        push_segment(&mut segments, &current);
    }

    Ok(segments)
}

/// Hard-slices `text` into character windows when it exceeds the budget.
///
/// Windows are counted in characters, not bytes, so multi-byte input never
/// splits inside a code point.
fn enforce_limit(text: &str, max_tokens: u32) -> Vec<String> {
    if estimate_tokens(text) <= max_tokens {
        return vec![text.to_string()];
    }

    let window = max_tokens as usize * CHARS_PER_TOKEN;
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(window)
        .map(|piece| piece.iter().collect())
        .collect()
}

fn push_segment(segments: &mut Vec<Segment>, text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    segments.push(Segment {
        content: trimmed.to_string(),
        token_count: estimate_tokens(trimmed),
    });
}
