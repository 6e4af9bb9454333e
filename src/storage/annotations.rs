//! Local annotation collection, keyed by page URL

use super::lock::KeyLocks;
use super::traits::{KvBackend, StorageResult};
use crate::model::{Annotation, ItemId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

const PREFIX: &str = "annotations:";

/// Annotations grouped by URL, one JSON array per URL key.
///
/// Every mutation runs under the per-URL write lock, so concurrent saves and
/// deletes never lose each other's updates.
pub struct LocalAnnotationStore {
    backend: Arc<dyn KvBackend>,
    locks: KeyLocks,
}

impl LocalAnnotationStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            locks: KeyLocks::new(),
        }
    }

    fn key(url: &str) -> String {
        format!("{PREFIX}{url}")
    }

    fn read(&self, key: &str) -> StorageResult<Vec<Annotation>> {
        match self.backend.get(key)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn write(&self, key: &str, items: &[Annotation]) -> StorageResult<()> {
        if items.is_empty() {
            self.backend.remove(key)?;
            return Ok(());
        }
        self.backend.set(key, &serde_json::to_string(items)?)
    }

    /// Annotations stored for `url`, in insertion order
    pub async fn get_for_url(&self, url: &str) -> StorageResult<Vec<Annotation>> {
        self.read(&Self::key(url))
    }

    /// Insert, or replace the annotation with the same id
    pub async fn save(&self, annotation: &Annotation) -> StorageResult<()> {
        let key = Self::key(&annotation.url);
        let _guard = self.locks.lock(&key).await;

        let mut items = self.read(&key)?;
        match items.iter_mut().find(|a| a.id == annotation.id) {
            Some(existing) => *existing = annotation.clone(),
            None => items.push(annotation.clone()),
        }
        self.write(&key, &items)?;
        debug!(url = %annotation.url, id = %annotation.id, "annotation saved");
        Ok(())
    }

    /// Remove an annotation. Returns the removed item; a missing id is a no-op.
    pub async fn delete(&self, url: &str, id: &ItemId) -> StorageResult<Option<Annotation>> {
        let key = Self::key(url);
        let _guard = self.locks.lock(&key).await;

        let mut items = self.read(&key)?;
        let Some(pos) = items.iter().position(|a| &a.id == id) else {
            return Ok(None);
        };
        let removed = items.remove(pos);
        self.write(&key, &items)?;
        debug!(url, id = %id, "annotation deleted");
        Ok(Some(removed))
    }

    /// Record the remote reference of a synced annotation.
    ///
    /// Returns false if the annotation no longer exists or already has one.
    pub async fn set_remote_ref(&self, url: &str, id: &ItemId, remote_ref: &str) -> StorageResult<bool> {
        let key = Self::key(url);
        let _guard = self.locks.lock(&key).await;

        let mut items = self.read(&key)?;
        let Some(item) = items.iter_mut().find(|a| &a.id == id) else {
            return Ok(false);
        };
        if !item.mark_synced(remote_ref) {
            return Ok(false);
        }
        self.write(&key, &items)?;
        Ok(true)
    }

    /// Every stored annotation, grouped by URL
    pub async fn get_all(&self) -> StorageResult<BTreeMap<String, Vec<Annotation>>> {
        let mut all = BTreeMap::new();
        for key in self.backend.keys_with_prefix(PREFIX)? {
            let items = self.read(&key)?;
            if let Some(url) = key.strip_prefix(PREFIX) {
                all.insert(url.to_string(), items);
            }
        }
        Ok(all)
    }

    /// Annotations with an author but no remote reference
    pub async fn pending(&self) -> StorageResult<Vec<Annotation>> {
        Ok(self
            .get_all()
            .await?
            .into_values()
            .flatten()
            .filter(Annotation::is_pending)
            .collect())
    }

    /// Remove every annotation
    pub async fn clear(&self) -> StorageResult<usize> {
        let _guard = self.locks.lock_all().await;
        self.backend.remove_prefix(PREFIX)
    }
}
