//! Blending local annotations with remote search results
//!
//! Local copies always win. Remote-only annotations are appended and cached
//! locally so later reads see them without the search service.

use crate::model::Annotation;
use crate::storage::{LocalAnnotationStore, StorageResult};
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Reference given to cached remote annotations that arrive without one
pub const INDEXED_REF_PREFIX: &str = "remote://indexed/";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search service unavailable: {0}")]
    Unavailable(String),
}

/// External index of annotations written by anyone
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn annotations_for_url(&self, url: &str) -> Result<Vec<Annotation>, SearchError>;
}

/// Search service answering from a fixed list
#[derive(Debug)]
pub struct StaticSearch {
    annotations: Vec<Annotation>,
    available: bool,
}

impl StaticSearch {
    pub fn new(annotations: Vec<Annotation>) -> Self {
        Self {
            annotations,
            available: true,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn unavailable() -> Self {
        Self {
            annotations: Vec::new(),
            available: false,
        }
    }
}

#[async_trait]
impl SearchService for StaticSearch {
    async fn annotations_for_url(&self, url: &str) -> Result<Vec<Annotation>, SearchError> {
        if !self.available {
            return Err(SearchError::Unavailable("static search configured as unavailable".into()));
        }
        Ok(self.annotations.iter().filter(|a| a.url == url).cloned().collect())
    }
}

/// Merge two lists by id.
///
/// Returns the merged list (local order, then remote-only items in remote
/// order) and the remote-only items on their own.
pub fn merge_by_id(local: Vec<Annotation>, remote: Vec<Annotation>) -> (Vec<Annotation>, Vec<Annotation>) {
    let mut seen: HashSet<_> = local.iter().map(|a| a.id.clone()).collect();
    let remote_only: Vec<Annotation> = remote
        .into_iter()
        .filter(|a| seen.insert(a.id.clone()))
        .collect();

    let mut merged = local;
    merged.extend(remote_only.iter().cloned());
    (merged, remote_only)
}

/// Annotations for `url` from both the local store and the search service.
///
/// A failing search degrades to the local list. Remote-only items are
/// written into the local store; a failed write is logged and the item is
/// still returned.
pub async fn merge_for_url(
    store: &LocalAnnotationStore,
    search: &dyn SearchService,
    url: &str,
) -> StorageResult<Vec<Annotation>> {
    let local = store.get_for_url(url).await?;

    let remote = match search.annotations_for_url(url).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!(url, error = %e, "search failed, showing local annotations only");
            return Ok(local);
        }
    };

    let (mut merged, remote_only) = merge_by_id(local, remote);
    merged.truncate(merged.len() - remote_only.len());

    for mut cached in remote_only {
        // cache under the page it was requested for, already synced
        cached.url = url.to_string();
        if cached.remote_ref.is_none() {
            cached.remote_ref = Some(format!("{INDEXED_REF_PREFIX}{}", cached.id));
        }
        match store.save(&cached).await {
            Ok(()) => debug!(url, id = %cached.id, "cached remote annotation"),
            Err(e) => warn!(url, id = %cached.id, error = %e, "could not cache remote annotation"),
        }
        merged.push(cached);
    }

    Ok(merged)
}
