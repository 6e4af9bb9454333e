//! Wire protocol between the coordinator and the worker context
//!
//! Requests travel as `{target, type, data}` envelopes and replies as
//! `{success, data?, error?}`. Only `serde_json::Value` crosses the context
//! boundary; both sides decode into the closed `SyncRequest` enum.

use crate::model::{Annotation, Drawing, QuoteAnchor};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Envelope target the worker answers to
pub const WORKER_TARGET: &str = "sync-worker";

/// Errors decoding or interpreting bridge messages
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("sync failed: {0}")]
    Failed(String),

    #[error("malformed message: {0}")]
    Decode(String),
}

/// Payload of `SYNC_ANNOTATION`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPayload {
    pub url: String,
    pub selected_text: String,
    pub comment: String,
    pub metadata: QuoteAnchor,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Annotation> for AnnotationPayload {
    /// Records that only carry a legacy path anchor sync with the selected
    /// text as a bare quote.
    fn from(annotation: &Annotation) -> Self {
        let metadata = annotation
            .anchor
            .quote
            .clone()
            .unwrap_or_else(|| QuoteAnchor::new("", annotation.selected_text.clone(), ""));
        Self {
            url: annotation.url.clone(),
            selected_text: annotation.selected_text.clone(),
            comment: annotation.comment.clone(),
            metadata,
            author: annotation.author.clone(),
            created_at: Some(annotation.timestamp),
        }
    }
}

/// Payload of `SYNC_DRAWING`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingPayload {
    pub url: String,
    pub canvas_data: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub author: String,
}

impl From<&Drawing> for DrawingPayload {
    fn from(drawing: &Drawing) -> Self {
        Self {
            url: drawing.url.clone(),
            canvas_data: drawing.canvas_data.clone(),
            timestamp: drawing.timestamp,
            author: drawing.author.clone(),
        }
    }
}

/// Payload of `DELETE_RECORD`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePayload {
    pub remote_ref: String,
}

/// Every operation the worker understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncRequest {
    SyncAnnotation(AnnotationPayload),
    SyncDrawing(DrawingPayload),
    SyncAllPending,
    GetSyncStatus,
    DeleteRecord(DeletePayload),
}

impl SyncRequest {
    /// Operation name as it appears on the wire
    pub fn op(&self) -> &'static str {
        match self {
            SyncRequest::SyncAnnotation(_) => "SYNC_ANNOTATION",
            SyncRequest::SyncDrawing(_) => "SYNC_DRAWING",
            SyncRequest::SyncAllPending => "SYNC_ALL_PENDING",
            SyncRequest::GetSyncStatus => "GET_SYNC_STATUS",
            SyncRequest::DeleteRecord(_) => "DELETE_RECORD",
        }
    }

    /// Wrap the request in a worker envelope
    pub fn to_envelope(&self) -> Result<Value, BridgeError> {
        let mut envelope = serde_json::to_value(self).map_err(|e| BridgeError::Decode(e.to_string()))?;
        match envelope.as_object_mut() {
            Some(obj) => {
                obj.insert("target".to_string(), Value::String(WORKER_TARGET.to_string()));
            }
            None => return Err(BridgeError::Decode("request did not encode to an object".into())),
        }
        Ok(envelope)
    }

    /// Decode an envelope addressed to the worker.
    ///
    /// A `null` or absent `data` is accepted for operations without payload.
    pub fn from_envelope(envelope: &Value) -> Result<Self, BridgeError> {
        let obj = envelope
            .as_object()
            .ok_or_else(|| BridgeError::Decode("envelope is not an object".into()))?;

        match obj.get("target").and_then(Value::as_str) {
            Some(WORKER_TARGET) => {}
            Some(other) => return Err(BridgeError::Decode(format!("wrong target: {other}"))),
            None => return Err(BridgeError::Decode("wrong target: missing".into())),
        }

        let op = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::Decode("missing type".into()))?;

        let mut message = serde_json::Map::new();
        message.insert("type".to_string(), Value::String(op.to_string()));
        if let Some(data) = obj.get("data").filter(|d| !d.is_null()) {
            message.insert("data".to_string(), data.clone());
        }

        serde_json::from_value(Value::Object(message))
            .map_err(|e| BridgeError::Decode(format!("{op}: {e}")))
    }
}

/// `{remoteRef}` result of the single-item sync operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRefResult {
    pub remote_ref: String,
}

/// Result of `SYNC_ALL_PENDING`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAllResult {
    pub annotations_synced: usize,
    pub drawings_synced: usize,
}

/// Result of `GET_SYNC_STATUS`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub pending_annotations: usize,
    pub pending_drawings: usize,
    pub has_pending: bool,
}

impl SyncStatus {
    pub fn new(pending_annotations: usize, pending_drawings: usize) -> Self {
        Self {
            pending_annotations,
            pending_drawings,
            has_pending: pending_annotations + pending_drawings > 0,
        }
    }
}

/// Reply to any request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResponse {
    pub fn ok(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self::failure(format!("could not encode result: {e}")),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| json!({ "success": false, "error": e.to_string() }))
    }

    pub fn from_value(value: Value) -> Result<Self, BridgeError> {
        serde_json::from_value(value).map_err(|e| BridgeError::Decode(e.to_string()))
    }

    /// Decode the result payload of a successful reply
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, BridgeError> {
        if !self.success {
            return Err(BridgeError::Failed(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        let data = self.data.unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| BridgeError::Decode(e.to_string()))
    }
}
