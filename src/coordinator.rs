//! Entry points for UI actions
//!
//! Every write lands in local storage first. Remote sync is attempted right
//! after, through the bridge, and its failure never undoes the local write.

use crate::anchor::AnchorError;
use crate::bridge::{AnnotationPayload, BridgeError, DrawingPayload, SyncAllResult, SyncBridge, SyncStatus};
use crate::config::ConfigError;
use crate::identity::IdentityProvider;
use crate::merge::{merge_for_url, SearchService, INDEXED_REF_PREFIX};
use crate::model::{
    normalize_url, validate_annotation, validate_drawing, AnchorData, Annotation, Drawing, ItemId, Limits,
    NewAnnotation, NewDrawing, ValidationError,
};
use crate::storage::{LocalAnnotationStore, LocalDrawingStore, QuotaInfo, QuotaLevel, StorageError};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Errors that reach the user
#[derive(Debug, Error)]
pub enum PagenoteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Anchor(#[from] AnchorError),
}

impl PagenoteError {
    /// Local storage ran out of room
    pub fn is_quota(&self) -> bool {
        matches!(self, PagenoteError::Storage(e) if e.is_quota())
    }
}

pub type PagenoteResult<T> = Result<T, PagenoteError>;

/// Where a freshly saved item stands with the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum SyncState {
    /// Written remotely; carries the remote reference
    Synced(String),
    /// Saved locally, remote write failed and will be retried
    Pending { warning: String },
    /// Nobody signed in, so the item is never synced
    LocalOnly,
}

/// Result of a save action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOutcome<T> {
    pub item: T,
    pub sync: SyncState,
    /// Storage usage seen before a drawing save
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaLevel>,
}

pub struct Coordinator {
    annotations: Arc<LocalAnnotationStore>,
    drawings: Arc<LocalDrawingStore>,
    bridge: Arc<SyncBridge>,
    identity: Arc<dyn IdentityProvider>,
    search: Arc<dyn SearchService>,
    limits: Limits,
    background: Mutex<JoinSet<()>>,
}

impl Coordinator {
    pub fn new(
        annotations: Arc<LocalAnnotationStore>,
        drawings: Arc<LocalDrawingStore>,
        bridge: Arc<SyncBridge>,
        identity: Arc<dyn IdentityProvider>,
        search: Arc<dyn SearchService>,
    ) -> Self {
        Self {
            annotations,
            drawings,
            bridge,
            identity,
            search,
            limits: Limits::default(),
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn bridge(&self) -> &Arc<SyncBridge> {
        &self.bridge
    }

    fn pending_warning(e: &BridgeError) -> SyncState {
        SyncState::Pending {
            warning: format!("saved locally, remote sync will be retried: {e}"),
        }
    }

    /// Validate, save locally, then try to sync
    #[tracing::instrument(skip(self, input), fields(url = %input.url))]
    pub async fn create_annotation(&self, input: NewAnnotation) -> PagenoteResult<SaveOutcome<Annotation>> {
        let url = validate_annotation(&input, &self.limits)?;
        let author = self.identity.current_author();

        let mut annotation = Annotation::new(url, input.selected_text, input.comment, AnchorData::quote(input.anchor));
        if let Some(color) = input.color {
            annotation = annotation.with_color(color);
        }
        if let Some(author) = &author {
            annotation = annotation.with_author(author.clone());
        }
        self.annotations.save(&annotation).await?;
        info!(id = %annotation.id, "annotation saved");

        if author.is_none() {
            return Ok(SaveOutcome {
                item: annotation,
                sync: SyncState::LocalOnly,
                quota: None,
            });
        }

        let sync = match self.bridge.sync_annotation(AnnotationPayload::from(&annotation)).await {
            Ok(synced) => {
                if let Err(e) = self
                    .annotations
                    .set_remote_ref(&annotation.url, &annotation.id, &synced.remote_ref)
                    .await
                {
                    warn!(id = %annotation.id, error = %e, "synced but could not record remote reference");
                }
                annotation.mark_synced(synced.remote_ref.clone());
                SyncState::Synced(synced.remote_ref)
            }
            Err(e) => {
                warn!(id = %annotation.id, error = %e, "annotation sync failed");
                Self::pending_warning(&e)
            }
        };

        Ok(SaveOutcome {
            item: annotation,
            sync,
            quota: None,
        })
    }

    /// Replace the page's drawing, then try to sync it
    #[tracing::instrument(skip(self, input), fields(url = %input.url))]
    pub async fn save_drawing(&self, input: NewDrawing) -> PagenoteResult<SaveOutcome<Drawing>> {
        let url = validate_drawing(&input, &self.limits)?;
        let author = self.identity.current_author();

        let mut drawing = Drawing::new(url, input.canvas_data);
        if let Some(author) = &author {
            drawing = drawing.with_author(author.clone());
        }
        let level = self.drawings.save(&drawing).await?;
        info!(id = %drawing.id, bytes = drawing.payload_len(), "drawing saved");

        if author.is_none() {
            return Ok(SaveOutcome {
                item: drawing,
                sync: SyncState::LocalOnly,
                quota: Some(level),
            });
        }

        let sync = match self.bridge.sync_drawing(DrawingPayload::from(&drawing)).await {
            Ok(synced) => {
                if let Err(e) = self
                    .drawings
                    .set_remote_ref(&drawing.url, &drawing.id, &synced.remote_ref)
                    .await
                {
                    warn!(id = %drawing.id, error = %e, "synced but could not record remote reference");
                }
                drawing.mark_synced(synced.remote_ref.clone());
                SyncState::Synced(synced.remote_ref)
            }
            Err(e) => {
                warn!(id = %drawing.id, error = %e, "drawing sync failed");
                Self::pending_warning(&e)
            }
        };

        Ok(SaveOutcome {
            item: drawing,
            sync,
            quota: Some(level),
        })
    }

    /// Ask the worker to delete a remote copy without waiting for it
    fn forget_remote(&self, remote_ref: Option<String>) {
        let Some(remote_ref) = remote_ref else { return };
        // cached copies of other people's records are not ours to delete
        if remote_ref.starts_with(INDEXED_REF_PREFIX) {
            return;
        }
        let bridge = self.bridge.clone();
        let mut tasks = self.background.lock().unwrap();
        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                warn!(error = %e, "background task failed");
            }
        }
        tasks.spawn(async move {
            match bridge.delete_record(remote_ref.clone()).await {
                Ok(()) => debug!(remote_ref, "remote copy deleted"),
                Err(e) => warn!(remote_ref, error = %e, "remote delete failed"),
            }
        });
    }

    /// Wait for fire-and-forget remote deletes started so far
    pub async fn wait_background(&self) {
        let mut tasks = std::mem::take(&mut *self.background.lock().unwrap());
        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                warn!(error = %e, "background task failed");
            }
        }
    }

    /// Delete locally; a synced annotation is also deleted remotely, best effort
    pub async fn delete_annotation(&self, url: &str, id: &ItemId) -> PagenoteResult<bool> {
        let url = normalize_url(url)?;
        let Some(removed) = self.annotations.delete(&url, id).await? else {
            return Ok(false);
        };
        self.forget_remote(removed.remote_ref);
        Ok(true)
    }

    pub async fn delete_drawing(&self, url: &str) -> PagenoteResult<bool> {
        let url = normalize_url(url)?;
        let Some(removed) = self.drawings.delete(&url).await? else {
            return Ok(false);
        };
        self.forget_remote(removed.remote_ref);
        Ok(true)
    }

    /// Local annotations plus remote-only ones from search
    pub async fn annotations_for_url(&self, url: &str) -> PagenoteResult<Vec<Annotation>> {
        let url = normalize_url(url)?;
        Ok(merge_for_url(&self.annotations, self.search.as_ref(), &url).await?)
    }

    pub async fn drawing_for_url(&self, url: &str) -> PagenoteResult<Option<Drawing>> {
        let url = normalize_url(url)?;
        Ok(self.drawings.get_for_url(&url).await?)
    }

    /// Pending counts from the worker, or from local storage when the worker
    /// cannot be reached
    pub async fn sync_status(&self) -> PagenoteResult<SyncStatus> {
        match self.bridge.sync_status().await {
            Ok(status) => Ok(status),
            Err(e) => {
                debug!(error = %e, "worker unavailable, counting pending items locally");
                let annotations = self.annotations.pending().await?.len();
                let drawings = self.drawings.pending().await?.len();
                Ok(SyncStatus::new(annotations, drawings))
            }
        }
    }

    /// Sync everything pending right away
    pub async fn sync_now(&self) -> Result<SyncAllResult, BridgeError> {
        self.bridge.sync_all_pending().await
    }

    pub fn quota(&self) -> PagenoteResult<QuotaInfo> {
        Ok(self.drawings.check_quota()?)
    }
}
