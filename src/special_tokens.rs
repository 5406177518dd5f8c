//! Helpers for arranging the control-token inventory shared by the annotator and the encoder.

use std::collections::HashSet;

/// Token identifier used throughout the crate.
pub type TokenId = u32;

/// Marker emitted before every document and once more at the end of each source.
pub const END_OF_TEXT: &str = "<|endoftext|>";
/// Opening marker wrapped around a document reference.
pub const REFERENCE_OPEN: &str = "<|br|>";
/// Closing marker wrapped around a document reference.
pub const REFERENCE_CLOSE: &str = "<|er|>";

/// Returns the default control-token inventory in canonical order.
#[must_use]
pub fn default_tokens() -> Vec<String> {
    vec![
        END_OF_TEXT.to_string(),
        REFERENCE_OPEN.to_string(),
        REFERENCE_CLOSE.to_string(),
    ]
}

/// Builds a token inventory from `base` followed by any `extras` not already present.
pub fn merge_tokens(base: &[String], extras: &[String]) -> Vec<String> {
    let mut tokens = base.to_vec();
    tokens.extend(extras.iter().cloned());
    dedup_in_place(&mut tokens);
    tokens
}

/// Deduplicates tokens in-place while preserving the first occurrence ordering.
pub fn dedup_in_place(tokens: &mut Vec<String>) {
    let mut seen = HashSet::with_capacity(tokens.len());
    tokens.retain(|token| seen.insert(token.clone()));
}

/// Finds the earliest verbatim occurrence of any of `tokens` in `text`.
///
/// Returns the byte offset together with the matching token. When two tokens start at the same
/// offset the longer one wins.
pub fn find_first<'t, I>(text: &str, tokens: I) -> Option<(usize, &'t str)>
where
    I: IntoIterator<Item = &'t str>,
{
    let mut best: Option<(usize, &'t str)> = None;
    for token in tokens {
        if token.is_empty() {
            continue;
        }
        if let Some(offset) = text.find(token) {
            best = match best {
                Some((current, existing))
                    if current < offset || (current == offset && existing.len() >= token.len()) =>
                {
                    Some((current, existing))
                }
                _ => Some((offset, token)),
            };
        }
    }
    best
}
