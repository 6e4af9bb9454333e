//! Minimal document tree used at the anchoring boundary
//!
//! Mirrors the parts of a live page that anchoring needs: element nesting
//! and text nodes. The plain text of a document is the concatenation of its
//! text nodes in document order, the way `textContent` reads.

use super::quote::TextRange;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A node in a document tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocNode {
    Element { tag: String, children: Vec<DocNode> },
    Text { text: String },
}

impl DocNode {
    pub fn element(tag: impl Into<String>, children: Vec<DocNode>) -> Self {
        Self::Element {
            tag: tag.into(),
            children,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    fn child(&self, index: usize) -> Option<&DocNode> {
        match self {
            Self::Element { children, .. } => children.get(index),
            Self::Text { .. } => None,
        }
    }

    fn child_mut(&mut self, index: usize) -> Option<&mut DocNode> {
        match self {
            Self::Element { children, .. } => children.get_mut(index),
            Self::Text { .. } => None,
        }
    }
}

/// Child-index path from the root, written as `0/2/1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn new(indexes: Vec<usize>) -> Self {
        Self(indexes)
    }

    pub fn indexes(&self) -> &[usize] {
        &self.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join("/"))
    }
}

impl FromStr for NodePath {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_matches('/');
        if s.is_empty() {
            return Ok(Self::default());
        }
        s.split('/')
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// A position inside a text node: path plus character offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub path: NodePath,
    pub offset: usize,
}

/// A text node and where its text starts in the plain text
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    path: NodePath,
    start: usize,
    len: usize,
}

/// A document tree plus its precomputed plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: DocNode,
    plain: String,
    segments: Vec<Segment>,
}

impl Document {
    pub fn new(root: DocNode) -> Self {
        let mut doc = Self {
            root,
            plain: String::new(),
            segments: Vec::new(),
        };
        doc.reindex();
        doc
    }

    /// A document holding a single paragraph of text
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(DocNode::element("body", vec![DocNode::element("p", vec![DocNode::text(text)])]))
    }

    /// Build a document with one paragraph per blank-line separated block
    pub fn from_paragraphs(text: &str) -> Self {
        let paragraphs = text
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .map(|p| DocNode::element("p", vec![DocNode::text(p)]))
            .collect();
        Self::new(DocNode::element("body", paragraphs))
    }

    pub fn root(&self) -> &DocNode {
        &self.root
    }

    pub fn plain_text(&self) -> &str {
        &self.plain
    }

    pub fn node_at(&self, path: &NodePath) -> Option<&DocNode> {
        path.indexes().iter().try_fold(&self.root, |node, &i| node.child(i))
    }

    /// Replace the text of a text node, simulating a script rewriting the page.
    /// Returns false if `path` does not address a text node.
    pub fn set_text(&mut self, path: &NodePath, text: impl Into<String>) -> bool {
        let target = path
            .indexes()
            .iter()
            .try_fold(&mut self.root, |node, &i| node.child_mut(i));
        match target {
            Some(DocNode::Text { text: existing }) => {
                *existing = text.into();
                self.reindex();
                true
            }
            _ => false,
        }
    }

    /// Convert a position inside a text node to a plain-text byte offset
    pub fn offset_of(&self, position: &Position) -> Option<usize> {
        let segment = self.segments.iter().find(|s| s.path == position.path)?;
        let text = &self.plain[segment.start..segment.start + segment.len];
        let byte = char_to_byte(text, position.offset)?;
        Some(segment.start + byte)
    }

    /// Convert a plain-text byte offset to a position inside a text node.
    ///
    /// An offset on a boundary between two nodes maps to the end of the
    /// earlier node when `prefer_end` is set, otherwise to the start of the
    /// later one.
    pub fn position_of(&self, offset: usize, prefer_end: bool) -> Option<Position> {
        if !self.plain.is_char_boundary(offset) {
            return None;
        }
        let segment = if prefer_end {
            self.segments
                .iter()
                .find(|s| s.len > 0 && offset > s.start && offset <= s.start + s.len)
        } else {
            self.segments
                .iter()
                .find(|s| s.len > 0 && offset >= s.start && offset < s.start + s.len)
        }
        .or_else(|| self.segments.iter().find(|s| offset >= s.start && offset <= s.start + s.len))?;

        let text = &self.plain[segment.start..segment.start + segment.len];
        let chars = text[..offset - segment.start].chars().count();
        Some(Position {
            path: segment.path.clone(),
            offset: chars,
        })
    }

    /// Map a plain-text range to start and end positions
    pub fn positions_of(&self, range: TextRange) -> Option<(Position, Position)> {
        let start = self.position_of(range.start, false)?;
        let end = self.position_of(range.end, true)?;
        Some((start, end))
    }

    fn reindex(&mut self) {
        let mut plain = String::new();
        let mut segments = Vec::new();
        collect_text(&self.root, &mut Vec::new(), &mut plain, &mut segments);
        self.plain = plain;
        self.segments = segments;
    }
}

fn collect_text(node: &DocNode, path: &mut Vec<usize>, plain: &mut String, segments: &mut Vec<Segment>) {
    match node {
        DocNode::Text { text } => {
            segments.push(Segment {
                path: NodePath::new(path.clone()),
                start: plain.len(),
                len: text.len(),
            });
            plain.push_str(text);
        }
        DocNode::Element { children, .. } => {
            for (i, child) in children.iter().enumerate() {
                path.push(i);
                collect_text(child, path, plain, segments);
                path.pop();
            }
        }
    }
}

/// Byte index of the `chars`-th character, allowing one past the end
fn char_to_byte(text: &str, chars: usize) -> Option<usize> {
    if chars == text.chars().count() {
        return Some(text.len());
    }
    text.char_indices().nth(chars).map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::new(DocNode::element(
            "body",
            vec![
                DocNode::element("h1", vec![DocNode::text("Title")]),
                DocNode::element(
                    "p",
                    vec![
                        DocNode::text("Hello "),
                        DocNode::element("b", vec![DocNode::text("world")]),
                        DocNode::text("! Goodbye."),
                    ],
                ),
            ],
        ))
    }

    #[test]
    fn plain_text_concatenates_text_nodes() {
        assert_eq!(sample().plain_text(), "TitleHello world! Goodbye.");
    }

    #[test]
    fn node_path_parses_and_displays() {
        let path: NodePath = "1/1/0".parse().unwrap();
        assert_eq!(path.indexes(), &[1, 1, 0]);
        assert_eq!(path.to_string(), "1/1/0");
        assert!("1/x".parse::<NodePath>().is_err());
        assert_eq!("/".parse::<NodePath>().unwrap(), NodePath::default());
    }

    #[test]
    fn offsets_round_trip_through_positions() {
        let doc = sample();
        let start = doc.plain_text().find("world").unwrap();
        let (s, e) = doc.positions_of(TextRange::new(start, start + 5)).unwrap();
        assert_eq!(s.path.to_string(), "1/1/0");
        assert_eq!(s.offset, 0);
        assert_eq!(e.path.to_string(), "1/1/0");
        assert_eq!(e.offset, 5);
        assert_eq!(doc.offset_of(&s), Some(start));
        assert_eq!(doc.offset_of(&e), Some(start + 5));
    }

    #[test]
    fn set_text_reindexes() {
        let mut doc = sample();
        assert!(doc.set_text(&"1/1/0".parse().unwrap(), "there"));
        assert_eq!(doc.plain_text(), "TitleHello there! Goodbye.");
        assert!(!doc.set_text(&"1/1".parse().unwrap(), "nope"));
        assert!(!doc.set_text(&"9".parse().unwrap(), "nope"));
    }

    #[test]
    fn paragraphs_become_separate_nodes() {
        let doc = Document::from_paragraphs("one\n\ntwo\n\n");
        assert_eq!(doc.plain_text(), "onetwo");
        assert!(matches!(doc.node_at(&"1/0".parse().unwrap()), Some(DocNode::Text { .. })));
    }
}
