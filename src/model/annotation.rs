//! Annotation records and their anchor data

use super::id::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Context-quote anchor: the selected text plus the text around it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuoteAnchor {
    pub prefix: String,
    pub exact: String,
    pub suffix: String,
}

impl QuoteAnchor {
    pub fn new(prefix: impl Into<String>, exact: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            exact: exact.into(),
            suffix: suffix.into(),
        }
    }
}

/// Structural anchor written by older clients.
///
/// Paths are `/`-separated child indexes from the document root; offsets
/// count characters inside the addressed text nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathAnchor {
    pub start_path: String,
    pub end_path: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Anchor fields as they appear on a stored record.
///
/// Both forms are flattened into the record. Either may be missing, and old
/// records sometimes carry both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnchorData {
    #[serde(flatten)]
    pub quote: Option<QuoteAnchor>,
    #[serde(flatten)]
    pub path: Option<PathAnchor>,
}

impl AnchorData {
    pub fn quote(quote: QuoteAnchor) -> Self {
        Self {
            quote: Some(quote),
            path: None,
        }
    }

    pub fn path(path: PathAnchor) -> Self {
        Self {
            quote: None,
            path: Some(path),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quote.is_none() && self.path.is_none()
    }
}

fn default_color() -> String {
    "yellow".to_string()
}

/// A text annotation anchored to a passage of a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: ItemId,
    /// Owning page, normalized
    pub url: String,
    pub selected_text: String,
    pub comment: String,
    #[serde(flatten)]
    pub anchor: AnchorData,
    pub timestamp: DateTime<Utc>,
    /// Creator identity; empty when created while signed out
    #[serde(default)]
    pub author: String,
    /// Reference assigned by the remote store once synced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_ref: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
}

impl Annotation {
    /// Create a new, unsynced annotation with a fresh id
    pub fn new(
        url: impl Into<String>,
        selected_text: impl Into<String>,
        comment: impl Into<String>,
        anchor: AnchorData,
    ) -> Self {
        Self {
            id: ItemId::new(),
            url: url.into(),
            selected_text: selected_text.into(),
            comment: comment.into(),
            anchor,
            timestamp: Utc::now(),
            author: String::new(),
            remote_ref: None,
            color: default_color(),
        }
    }

    pub fn with_id(mut self, id: impl Into<ItemId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_remote_ref(mut self, remote_ref: impl Into<String>) -> Self {
        self.remote_ref = Some(remote_ref.into());
        self
    }

    pub fn is_synced(&self) -> bool {
        self.remote_ref.is_some()
    }

    /// Has a known author but has not reached the remote store yet
    pub fn is_pending(&self) -> bool {
        !self.author.is_empty() && self.remote_ref.is_none()
    }

    /// Record the remote reference. Returns false if one was already set.
    pub fn mark_synced(&mut self, remote_ref: impl Into<String>) -> bool {
        if self.remote_ref.is_some() {
            return false;
        }
        self.remote_ref = Some(remote_ref.into());
        true
    }
}

/// What a UI action supplies when creating an annotation
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnnotation {
    pub url: String,
    pub selected_text: String,
    pub comment: String,
    pub anchor: QuoteAnchor,
    pub color: Option<String>,
}

impl NewAnnotation {
    pub fn new(
        url: impl Into<String>,
        selected_text: impl Into<String>,
        comment: impl Into<String>,
        anchor: QuoteAnchor,
    ) -> Self {
        Self {
            url: url.into(),
            selected_text: selected_text.into(),
            comment: comment.into(),
            anchor,
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}
