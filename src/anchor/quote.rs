//! Context-quote anchoring over plain text
//!
//! Works on plain strings and byte offsets only, so the search and
//! tie-break rules can be tested without a document tree.

use super::AnchorError;
use crate::model::QuoteAnchor;
use serde::{Deserialize, Serialize};

/// Characters of context captured on each side of a selection
pub const DEFAULT_CONTEXT_LEN: usize = 32;

/// Upper bound on the captured selection, in characters
pub const DEFAULT_MAX_EXACT_LEN: usize = 5000;

/// A half-open byte range into a document's plain text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The covered text. Panics if the range does not fit `text`.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Bounds applied when capturing a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteOptions {
    pub context_len: usize,
    pub max_exact_len: usize,
}

impl Default for QuoteOptions {
    fn default() -> Self {
        Self {
            context_len: DEFAULT_CONTEXT_LEN,
            max_exact_len: DEFAULT_MAX_EXACT_LEN,
        }
    }
}

/// Capture a context-quote anchor for `range` within `text`.
///
/// A selection longer than `max_exact_len` is cut at that many characters and
/// the suffix is taken from after the cut, so the three parts stay contiguous.
pub fn compute_quote(text: &str, range: TextRange, options: QuoteOptions) -> Result<QuoteAnchor, AnchorError> {
    if range.start > range.end
        || range.end > text.len()
        || !text.is_char_boundary(range.start)
        || !text.is_char_boundary(range.end)
    {
        return Err(AnchorError::OutOfBounds {
            start: range.start,
            end: range.end,
            len: text.len(),
        });
    }
    if range.is_empty() {
        return Err(AnchorError::EmptySelection);
    }

    let selected = range.slice(text);
    let exact_end = match selected.char_indices().nth(options.max_exact_len) {
        Some((cut, _)) => range.start + cut,
        None => range.end,
    };

    let before = &text[..range.start];
    let prefix_start = before
        .char_indices()
        .rev()
        .take(options.context_len)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(range.start);

    let after = &text[exact_end..];
    let suffix_len = after
        .char_indices()
        .nth(options.context_len)
        .map(|(i, _)| i)
        .unwrap_or(after.len());

    Ok(QuoteAnchor {
        prefix: before[prefix_start..].to_string(),
        exact: text[range.start..exact_end].to_string(),
        suffix: after[..suffix_len].to_string(),
    })
}

/// Locate a quote in `text`.
///
/// Searches for `prefix + exact + suffix` and returns the range covering
/// `exact` in the first occurrence. Ambiguous quotes always resolve to the
/// earliest match in document order, which is not necessarily where the
/// selection was originally made.
pub fn resolve_quote(anchor: &QuoteAnchor, text: &str) -> Option<TextRange> {
    if anchor.exact.is_empty() {
        return None;
    }
    let needle = format!("{}{}{}", anchor.prefix, anchor.exact, anchor.suffix);
    let at = text.find(&needle)?;
    let start = at + anchor.prefix.len();
    Some(TextRange::new(start, start + anchor.exact.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "Hello world! Goodbye.";

    fn range_of(text: &str, needle: &str) -> TextRange {
        let start = text.find(needle).unwrap();
        TextRange::new(start, start + needle.len())
    }

    #[test]
    fn compute_then_resolve_round_trips() {
        let anchor = compute_quote(DOC, range_of(DOC, "world"), QuoteOptions::default()).unwrap();
        assert_eq!(anchor.prefix, "Hello ");
        assert_eq!(anchor.exact, "world");
        assert_eq!(anchor.suffix, "! Goodbye.");

        let range = resolve_quote(&anchor, DOC).expect("resolves");
        assert_eq!(range.slice(DOC), "world");
    }

    #[test]
    fn resolve_fails_quietly_when_text_removed() {
        let anchor = compute_quote(DOC, range_of(DOC, "world"), QuoteOptions::default()).unwrap();
        assert_eq!(resolve_quote(&anchor, "Hello there! Goodbye."), None);
        assert_eq!(resolve_quote(&anchor, ""), None);
    }

    #[test]
    fn context_is_bounded() {
        let text = "abcdefghij-TARGET-klmnopqrst";
        let options = QuoteOptions { context_len: 3, max_exact_len: 100 };
        let anchor = compute_quote(text, range_of(text, "TARGET"), options).unwrap();
        assert_eq!(anchor.prefix, "ij-");
        assert_eq!(anchor.suffix, "-kl");
    }

    #[test]
    fn selection_at_document_edges_has_empty_context() {
        let anchor = compute_quote(DOC, range_of(DOC, "Hello"), QuoteOptions::default()).unwrap();
        assert_eq!(anchor.prefix, "");
        let anchor = compute_quote(DOC, range_of(DOC, "Goodbye."), QuoteOptions::default()).unwrap();
        assert_eq!(anchor.suffix, "");
        assert!(resolve_quote(&anchor, DOC).is_some());
    }

    #[test]
    fn long_selection_is_cut_and_stays_resolvable() {
        let text = "before 0123456789 after";
        let options = QuoteOptions { context_len: 4, max_exact_len: 5 };
        let anchor = compute_quote(text, range_of(text, "0123456789"), options).unwrap();
        assert_eq!(anchor.exact, "01234");
        assert_eq!(anchor.suffix, "5678");
        let range = resolve_quote(&anchor, text).unwrap();
        assert_eq!(range.slice(text), "01234");
    }

    #[test]
    fn ambiguous_quote_resolves_to_first_occurrence() {
        let text = "the cat sat. the cat sat.";
        let anchor = QuoteAnchor::new("the ", "cat", " sat");
        let range = resolve_quote(&anchor, text).unwrap();
        assert_eq!(range.start, 4);
    }

    #[test]
    fn context_disambiguates_repeated_words() {
        let text = "red apple, green apple";
        let second = text.rfind("apple").unwrap();
        let anchor = compute_quote(text, TextRange::new(second, second + 5), QuoteOptions::default()).unwrap();
        let range = resolve_quote(&anchor, text).unwrap();
        assert_eq!(range.start, second);
    }

    #[test]
    fn multibyte_context_respects_char_boundaries() {
        let text = "café ☕ naïve résumé";
        let anchor = compute_quote(
            text,
            range_of(text, "naïve"),
            QuoteOptions { context_len: 2, max_exact_len: 100 },
        )
        .unwrap();
        assert_eq!(anchor.prefix, "☕ ");
        assert_eq!(anchor.suffix, " r");
        assert_eq!(resolve_quote(&anchor, text).unwrap().slice(text), "naïve");
    }

    #[test]
    fn invalid_ranges_are_errors() {
        assert_eq!(
            compute_quote(DOC, TextRange::new(3, 3), QuoteOptions::default()),
            Err(AnchorError::EmptySelection)
        );
        assert!(matches!(
            compute_quote(DOC, TextRange::new(5, 500), QuoteOptions::default()),
            Err(AnchorError::OutOfBounds { .. })
        ));
        assert!(matches!(
            compute_quote("é", TextRange::new(1, 2), QuoteOptions::default()),
            Err(AnchorError::OutOfBounds { .. })
        ));
    }
}
