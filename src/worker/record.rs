//! Remote record formats

use super::WorkerError;
use crate::bridge::AnnotationPayload;
use crate::model::QuoteAnchor;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Collection annotation records are written to
pub const ANNOTATION_COLLECTION: &str = "app.pagenote.annotation";

/// Annotation as stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub url: String,
    pub selected_text: String,
    pub comment: String,
    pub anchor: QuoteAnchor,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
}

impl AnnotationRecord {
    /// Build the record, stamping `now` when the payload carries no creation time
    pub fn from_payload(payload: &AnnotationPayload, now: DateTime<Utc>) -> Self {
        Self {
            record_type: ANNOTATION_COLLECTION.to_string(),
            url: payload.url.clone(),
            selected_text: payload.selected_text.clone(),
            comment: payload.comment.clone(),
            anchor: payload.metadata.clone(),
            created_at: payload.created_at.unwrap_or(now),
            author: payload.author.clone(),
        }
    }
}

/// Blob path of the drawing for a page. The same URL always maps to the same path.
pub fn drawing_path(url: &str) -> String {
    format!("drawings/{}.png", Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes()))
}

/// Decoded drawing payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasBlob {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Turn a canvas payload into bytes for blob storage.
///
/// `data:` URLs are decoded (base64 or plain); anything else is stored
/// verbatim as `application/octet-stream`.
pub fn decode_canvas(canvas_data: &str) -> Result<CanvasBlob, WorkerError> {
    let Some(rest) = canvas_data.strip_prefix("data:") else {
        return Ok(CanvasBlob {
            bytes: canvas_data.as_bytes().to_vec(),
            mime: "application/octet-stream".to_string(),
        });
    };

    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| WorkerError::InvalidPayload("data URL without ','".into()))?;

    let (media, is_base64) = match header.strip_suffix(";base64") {
        Some(media) => (media, true),
        None => (header, false),
    };
    let mime = match media.split(';').next() {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => "text/plain".to_string(),
    };

    let bytes = if is_base64 {
        BASE64
            .decode(body.trim())
            .map_err(|e| WorkerError::InvalidPayload(format!("canvas data is not valid base64: {e}")))?
    } else {
        body.as_bytes().to_vec()
    };

    Ok(CanvasBlob { bytes, mime })
}
