//! Structural path/offset anchors from older records

use super::document::{DocNode, Document, NodePath, Position};
use super::quote::TextRange;
use crate::model::PathAnchor;

/// Resolve a structural anchor by walking its paths into `doc`.
///
/// Both paths must address text nodes and both offsets must fall inside
/// them; the end must not precede the start. Anything else means the page
/// has changed shape since the anchor was written.
pub fn resolve_path(anchor: &PathAnchor, doc: &Document) -> Option<TextRange> {
    let start_path: NodePath = anchor.start_path.parse().ok()?;
    let end_path: NodePath = anchor.end_path.parse().ok()?;

    for path in [&start_path, &end_path] {
        if !matches!(doc.node_at(path), Some(DocNode::Text { .. })) {
            return None;
        }
    }

    let start = doc.offset_of(&Position {
        path: start_path,
        offset: anchor.start_offset,
    })?;
    let end = doc.offset_of(&Position {
        path: end_path,
        offset: anchor.end_offset,
    })?;
    if end < start {
        return None;
    }
    Some(TextRange::new(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(DocNode::element(
            "body",
            vec![DocNode::element(
                "p",
                vec![
                    DocNode::text("Hello "),
                    DocNode::element("em", vec![DocNode::text("wide")]),
                    DocNode::text(" world"),
                ],
            )],
        ))
    }

    fn anchor(start: &str, so: usize, end: &str, eo: usize) -> PathAnchor {
        PathAnchor {
            start_path: start.into(),
            end_path: end.into(),
            start_offset: so,
            end_offset: eo,
        }
    }

    #[test]
    fn resolves_range_within_one_node() {
        let doc = doc();
        let range = resolve_path(&anchor("0/2", 1, "0/2", 6), &doc).unwrap();
        assert_eq!(range.slice(doc.plain_text()), "world");
    }

    #[test]
    fn resolves_range_across_nodes() {
        let doc = doc();
        let range = resolve_path(&anchor("0/0", 0, "0/2", 6), &doc).unwrap();
        assert_eq!(range.slice(doc.plain_text()), "Hello wide world");
    }

    #[test]
    fn stale_paths_fail() {
        let doc = doc();
        assert!(resolve_path(&anchor("0/5", 0, "0/5", 1), &doc).is_none());
        // element, not text
        assert!(resolve_path(&anchor("0/1", 0, "0/1", 1), &doc).is_none());
        assert!(resolve_path(&anchor("0/0", 0, "0/0", 99), &doc).is_none());
        assert!(resolve_path(&anchor("0/2", 3, "0/0", 1), &doc).is_none());
        assert!(resolve_path(&anchor("html/body", 0, "0/0", 1), &doc).is_none());
    }
}
