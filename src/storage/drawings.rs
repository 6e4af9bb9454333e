//! Local drawing collection, one drawing per page URL

use super::lock::KeyLocks;
use super::traits::{BackendQuota, KvBackend, QuotaInfo, QuotaInspector, StorageResult};
use crate::model::{Drawing, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

const PREFIX: &str = "drawings:";

/// Usage levels at which drawing saves start logging
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaThresholds {
    pub warn_percent: f64,
    pub critical_percent: f64,
}

impl Default for QuotaThresholds {
    fn default() -> Self {
        Self {
            warn_percent: 75.0,
            critical_percent: 90.0,
        }
    }
}

/// How full storage was when a save started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaLevel {
    Normal,
    Warning,
    Critical,
}

impl QuotaThresholds {
    pub fn level(&self, quota: &QuotaInfo) -> QuotaLevel {
        if quota.percent_used >= self.critical_percent {
            QuotaLevel::Critical
        } else if quota.percent_used >= self.warn_percent {
            QuotaLevel::Warning
        } else {
            QuotaLevel::Normal
        }
    }
}

/// Drawings keyed by URL. Saving replaces the page's previous drawing.
///
/// Quota is inspected before each save but never blocks it; the backend
/// decides whether the write fits.
pub struct LocalDrawingStore {
    backend: Arc<dyn KvBackend>,
    quota: Arc<dyn QuotaInspector>,
    thresholds: QuotaThresholds,
    locks: KeyLocks,
}

impl LocalDrawingStore {
    /// Store whose quota is read from the backend itself
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        let quota = Arc::new(BackendQuota::new(backend.clone()));
        Self::with_quota(backend, quota)
    }

    pub fn with_quota(backend: Arc<dyn KvBackend>, quota: Arc<dyn QuotaInspector>) -> Self {
        Self {
            backend,
            quota,
            thresholds: QuotaThresholds::default(),
            locks: KeyLocks::new(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: QuotaThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    fn key(url: &str) -> String {
        format!("{PREFIX}{url}")
    }

    fn read(&self, key: &str) -> StorageResult<Option<Drawing>> {
        match self.backend.get(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn check_quota(&self) -> StorageResult<QuotaInfo> {
        self.quota.quota()
    }

    pub async fn get_for_url(&self, url: &str) -> StorageResult<Option<Drawing>> {
        self.read(&Self::key(url))
    }

    /// Replace the drawing for the drawing's URL.
    ///
    /// Returns the usage level seen before the write. A backend capacity
    /// failure comes back as `StorageError::QuotaExceeded` and leaves the
    /// previous drawing in place.
    pub async fn save(&self, drawing: &Drawing) -> StorageResult<QuotaLevel> {
        let level = match self.check_quota() {
            Ok(quota) => {
                let level = self.thresholds.level(&quota);
                match level {
                    QuotaLevel::Critical => error!(
                        url = %drawing.url,
                        percent_used = quota.percent_used,
                        used_bytes = quota.used_bytes,
                        total_bytes = quota.total_bytes,
                        "storage almost full, attempting drawing save anyway"
                    ),
                    QuotaLevel::Warning => warn!(
                        url = %drawing.url,
                        percent_used = quota.percent_used,
                        "storage usage high"
                    ),
                    QuotaLevel::Normal => {}
                }
                level
            }
            Err(e) => {
                warn!(error = %e, "could not read storage quota");
                QuotaLevel::Normal
            }
        };

        let key = Self::key(&drawing.url);
        let _guard = self.locks.lock(&key).await;
        if let Err(e) = self.backend.set(&key, &serde_json::to_string(drawing)?) {
            if e.is_quota() {
                error!(url = %drawing.url, bytes = drawing.payload_len(), error = %e, "drawing does not fit in local storage");
            }
            return Err(e);
        }
        debug!(url = %drawing.url, id = %drawing.id, bytes = drawing.payload_len(), "drawing saved");
        Ok(level)
    }

    /// Remove the drawing for `url`, returning it if there was one
    pub async fn delete(&self, url: &str) -> StorageResult<Option<Drawing>> {
        let key = Self::key(url);
        let _guard = self.locks.lock(&key).await;
        let existing = self.read(&key)?;
        if existing.is_some() {
            self.backend.remove(&key)?;
            debug!(url, "drawing deleted");
        }
        Ok(existing)
    }

    /// Record the remote reference of a synced drawing.
    ///
    /// Only applies while `id` is still the page's drawing; a newer save in
    /// the meantime keeps its own pending state.
    pub async fn set_remote_ref(&self, url: &str, id: &ItemId, remote_ref: &str) -> StorageResult<bool> {
        let key = Self::key(url);
        let _guard = self.locks.lock(&key).await;
        let Some(mut drawing) = self.read(&key)? else {
            return Ok(false);
        };
        if &drawing.id != id || !drawing.mark_synced(remote_ref) {
            return Ok(false);
        }
        self.backend.set(&key, &serde_json::to_string(&drawing)?)?;
        Ok(true)
    }

    pub async fn get_all(&self) -> StorageResult<BTreeMap<String, Drawing>> {
        let mut all = BTreeMap::new();
        for key in self.backend.keys_with_prefix(PREFIX)? {
            if let (Some(url), Some(drawing)) = (key.strip_prefix(PREFIX), self.read(&key)?) {
                all.insert(url.to_string(), drawing);
            }
        }
        Ok(all)
    }

    /// Drawings with an author but no remote reference
    pub async fn pending(&self) -> StorageResult<Vec<Drawing>> {
        Ok(self
            .get_all()
            .await?
            .into_values()
            .filter(Drawing::is_pending)
            .collect())
    }
}
