//! The worker-side handler for bridge requests

use super::record::{decode_canvas, drawing_path, AnnotationRecord, ANNOTATION_COLLECTION};
use super::remote::RemoteStore;
use super::{WorkerError, WorkerResult};
use crate::bridge::{
    AnnotationPayload, DrawingPayload, EnvelopeHandler, SyncAllResult, SyncRefResult, SyncRequest,
    SyncResponse, SyncStatus,
};
use crate::model::normalize_url;
use crate::storage::{LocalAnnotationStore, LocalDrawingStore};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Performs remote writes on behalf of the coordinator.
///
/// Lives inside the worker context. Reads the local stores to find pending
/// items and records remote references once writes succeed.
pub struct RemoteSyncWorker {
    remote: Arc<dyn RemoteStore>,
    annotations: Arc<LocalAnnotationStore>,
    drawings: Arc<LocalDrawingStore>,
}

impl RemoteSyncWorker {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        annotations: Arc<LocalAnnotationStore>,
        drawings: Arc<LocalDrawingStore>,
    ) -> Self {
        Self {
            remote,
            annotations,
            drawings,
        }
    }

    /// Write one annotation record to the remote store
    #[tracing::instrument(skip(self, payload), fields(url = %payload.url))]
    pub async fn sync_annotation(&self, payload: &AnnotationPayload) -> WorkerResult<SyncRefResult> {
        if payload.selected_text.trim().is_empty() || payload.metadata.exact.is_empty() {
            return Err(WorkerError::InvalidPayload("annotation has no selected text".into()));
        }
        let record = AnnotationRecord::from_payload(payload, Utc::now());
        let remote_ref = self
            .remote
            .put_record(ANNOTATION_COLLECTION, serde_json::to_value(&record)?)
            .await?;
        debug!(remote_ref = %remote_ref, "annotation written");
        Ok(SyncRefResult { remote_ref })
    }

    /// Write a drawing blob at the page's deterministic path
    #[tracing::instrument(skip(self, payload), fields(url = %payload.url))]
    pub async fn sync_drawing(&self, payload: &DrawingPayload) -> WorkerResult<SyncRefResult> {
        let url = normalize_url(&payload.url).unwrap_or_else(|_| payload.url.clone());
        let blob = decode_canvas(&payload.canvas_data)?;
        let remote_ref = self
            .remote
            .put_blob(&drawing_path(&url), blob.bytes, &blob.mime)
            .await?;
        debug!(remote_ref = %remote_ref, "drawing written");
        Ok(SyncRefResult { remote_ref })
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_record(&self, remote_ref: &str) -> WorkerResult<()> {
        self.remote.delete(remote_ref).await?;
        debug!("remote record deleted");
        Ok(())
    }

    /// Sync every pending item, recording references as writes succeed.
    ///
    /// One item failing does not stop the batch; only successes are counted.
    #[tracing::instrument(skip(self))]
    pub async fn sync_all_pending(&self) -> WorkerResult<SyncAllResult> {
        let mut result = SyncAllResult::default();

        for annotation in self.annotations.pending().await? {
            let synced = match self.sync_annotation(&AnnotationPayload::from(&annotation)).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(url = %annotation.url, id = %annotation.id, error = %e, "annotation sync failed");
                    continue;
                }
            };
            match self
                .annotations
                .set_remote_ref(&annotation.url, &annotation.id, &synced.remote_ref)
                .await
            {
                Ok(true) => result.annotations_synced += 1,
                Ok(false) => warn!(url = %annotation.url, id = %annotation.id, remote_ref = %synced.remote_ref, "annotation gone or already synced before its reference was recorded"),
                Err(e) => warn!(url = %annotation.url, id = %annotation.id, error = %e, "could not record remote reference"),
            }
        }

        for drawing in self.drawings.pending().await? {
            let synced = match self.sync_drawing(&DrawingPayload::from(&drawing)).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(url = %drawing.url, id = %drawing.id, error = %e, "drawing sync failed");
                    continue;
                }
            };
            match self
                .drawings
                .set_remote_ref(&drawing.url, &drawing.id, &synced.remote_ref)
                .await
            {
                Ok(true) => result.drawings_synced += 1,
                Ok(false) => warn!(url = %drawing.url, id = %drawing.id, remote_ref = %synced.remote_ref, "drawing gone or already synced before its reference was recorded"),
                Err(e) => warn!(url = %drawing.url, id = %drawing.id, error = %e, "could not record remote reference"),
            }
        }

        info!(
            annotations = result.annotations_synced,
            drawings = result.drawings_synced,
            "pending items synced"
        );
        Ok(result)
    }

    pub async fn get_sync_status(&self) -> WorkerResult<SyncStatus> {
        let annotations = self.annotations.pending().await?.len();
        let drawings = self.drawings.pending().await?.len();
        Ok(SyncStatus::new(annotations, drawings))
    }

    /// Run one decoded request
    pub async fn handle(&self, request: SyncRequest) -> SyncResponse {
        let op = request.op();
        let result = match request {
            SyncRequest::SyncAnnotation(payload) => self.sync_annotation(&payload).await.map(SyncResponse::ok),
            SyncRequest::SyncDrawing(payload) => self.sync_drawing(&payload).await.map(SyncResponse::ok),
            SyncRequest::SyncAllPending => self.sync_all_pending().await.map(SyncResponse::ok),
            SyncRequest::GetSyncStatus => self.get_sync_status().await.map(SyncResponse::ok),
            SyncRequest::DeleteRecord(payload) => self
                .delete_record(&payload.remote_ref)
                .await
                .map(|()| SyncResponse::ok(serde_json::json!({}))),
        };
        result.unwrap_or_else(|e| {
            warn!(op, error = %e, "request failed");
            SyncResponse::failure(e.to_string())
        })
    }
}

#[async_trait]
impl EnvelopeHandler for RemoteSyncWorker {
    async fn handle_envelope(&self, envelope: Value) -> Value {
        match SyncRequest::from_envelope(&envelope) {
            Ok(request) => self.handle(request).await.to_value(),
            Err(e) => {
                debug!(error = %e, "ignoring envelope");
                SyncResponse::failure(e.to_string()).to_value()
            }
        }
    }
}
