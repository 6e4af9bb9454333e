//! Freehand drawings, one per page

use super::id::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A freehand drawing overlaid on a page
///
/// At most one drawing exists per `url`; saving again replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drawing {
    pub id: ItemId,
    pub url: String,
    /// Encoded raster payload, usually a `data:image/png;base64,...` URL
    pub canvas_data: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_ref: Option<String>,
}

impl Drawing {
    pub fn new(url: impl Into<String>, canvas_data: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            url: url.into(),
            canvas_data: canvas_data.into(),
            timestamp: Utc::now(),
            author: String::new(),
            remote_ref: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn is_synced(&self) -> bool {
        self.remote_ref.is_some()
    }

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

    /// Size of the payload in bytes
    pub fn payload_len(&self) -> usize {
        self.canvas_data.len()
    }
}

/// What a UI action supplies when saving a drawing
#[derive(Debug, Clone, PartialEq)]
pub struct NewDrawing {
    pub url: String,
    pub canvas_data: String,
}

impl NewDrawing {
    pub fn new(url: impl Into<String>, canvas_data: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            canvas_data: canvas_data.into(),
        }
    }
}
