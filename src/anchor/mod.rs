//! Text anchoring
//!
//! Computes durable anchors for selections and re-locates them in the
//! current page. The search logic lives in [`quote`] and works on plain
//! text; [`document`] is the thin adapter to a page tree.

pub mod document;
mod legacy;
mod quote;
mod refresh;

pub use document::{DocNode, Document, NodePath, Position};
pub use legacy::resolve_path;
pub use quote::{compute_quote, resolve_quote, QuoteOptions, TextRange, DEFAULT_CONTEXT_LEN, DEFAULT_MAX_EXACT_LEN};
pub use refresh::{AnchorRefresher, HighlightSink, PageSource, RefreshHandle, RefreshReport, RefreshTrigger};

use crate::model::AnchorData;
use thiserror::Error;

/// Errors raised while capturing an anchor.
///
/// Failing to *resolve* an anchor is not an error; see [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnchorError {
    #[error("selection is empty")]
    EmptySelection,

    #[error("range {start}..{end} does not fit text of length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },
}

/// A located anchor in a live document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange {
    pub range: TextRange,
    pub start: Position,
    pub end: Position,
    pub text: String,
}

/// Capture a context-quote anchor for a range of the document's plain text
pub fn compute(doc: &Document, range: TextRange, options: QuoteOptions) -> Result<AnchorData, AnchorError> {
    compute_quote(doc.plain_text(), range, options).map(AnchorData::quote)
}

/// Locate stored anchor data in `doc`.
///
/// The context quote takes precedence. The structural path is only used
/// when the record has no quote; a quote that fails to match does not fall
/// back to the path. `None` means the passage is gone, and callers skip
/// rendering without touching the stored annotation.
pub fn resolve(anchor: &AnchorData, doc: &Document) -> Option<ResolvedRange> {
    let range = match (&anchor.quote, &anchor.path) {
        (Some(quote), _) => resolve_quote(quote, doc.plain_text())?,
        (None, Some(path)) => resolve_path(path, doc)?,
        (None, None) => return None,
    };
    let (start, end) = doc.positions_of(range)?;
    Some(ResolvedRange {
        range,
        start,
        end,
        text: range.slice(doc.plain_text()).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PathAnchor, QuoteAnchor};

    #[test]
    fn compute_then_resolve_against_document() {
        let doc = Document::from_text("Hello world! Goodbye.");
        let start = doc.plain_text().find("world").unwrap();
        let anchor = compute(&doc, TextRange::new(start, start + 5), QuoteOptions::default()).unwrap();

        let resolved = resolve(&anchor, &doc).expect("resolves");
        assert_eq!(resolved.text, "world");
        assert_eq!(resolved.start.offset, 6);

        let edited = Document::from_text("Hello! Goodbye.");
        assert!(resolve(&anchor, &edited).is_none());
    }

    #[test]
    fn quote_wins_over_path_when_both_present() {
        let doc = Document::from_text("alpha beta gamma");
        let anchor = AnchorData {
            quote: Some(QuoteAnchor::new("alpha ", "beta", " gamma")),
            path: Some(PathAnchor {
                start_path: "0/0".into(),
                end_path: "0/0".into(),
                start_offset: 0,
                end_offset: 5,
            }),
        };
        assert_eq!(resolve(&anchor, &doc).unwrap().text, "beta");
    }

    #[test]
    fn failed_quote_does_not_fall_back_to_path() {
        let doc = Document::from_text("alpha beta gamma");
        let anchor = AnchorData {
            quote: Some(QuoteAnchor::new("", "delta", "")),
            path: Some(PathAnchor {
                start_path: "0/0".into(),
                end_path: "0/0".into(),
                start_offset: 0,
                end_offset: 5,
            }),
        };
        assert!(resolve(&anchor, &doc).is_none());
    }

    #[test]
    fn path_only_records_use_legacy_resolution() {
        let doc = Document::from_text("alpha beta gamma");
        let anchor = AnchorData::path(PathAnchor {
            start_path: "0/0".into(),
            end_path: "0/0".into(),
            start_offset: 0,
            end_offset: 5,
        });
        assert_eq!(resolve(&anchor, &doc).unwrap().text, "alpha");
        assert!(resolve(&AnchorData::default(), &doc).is_none());
    }
}
