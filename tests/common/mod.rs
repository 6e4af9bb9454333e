//! Shared helpers for pagenote integration tests
//!
//! Builds a full engine over a temporary SQLite file, an in-memory remote
//! and a switchable identity.

#![allow(dead_code)]

use pagenote::config::Config;
use pagenote::identity::StaticIdentity;
use pagenote::merge::{SearchService, StaticSearch};
use pagenote::storage::{KvBackend, MemoryBackend, OpenBackend, SqliteBackend};
use pagenote::worker::MemoryRemote;
use pagenote::{AnchorData, Annotation, QuoteAnchor, Runtime};
use std::sync::Arc;
use tempfile::TempDir;

pub const AUTHOR: &str = "did:example:alice";
pub const PAGE: &str = "https://example.com/article";

pub struct Harness {
    pub runtime: Runtime,
    pub remote: Arc<MemoryRemote>,
    pub identity: Arc<StaticIdentity>,
    // keeps the database file alive
    _dir: Option<TempDir>,
}

impl Harness {
    /// Signed-in engine over a fresh SQLite database
    pub fn sqlite() -> Self {
        Self::sqlite_with(Config::default(), Arc::new(StaticSearch::empty()))
    }

    pub fn sqlite_with(config: Config, search: Arc<dyn SearchService>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path().join("pagenote.db"), config.storage.capacity_bytes).unwrap();
        Self::build(config, Arc::new(backend), search, Some(dir))
    }

    /// Signed-in engine over an in-memory backend of the given capacity
    pub fn memory(capacity: u64) -> (Self, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::with_capacity(capacity));
        let harness = Self::build(Config::default(), backend.clone(), Arc::new(StaticSearch::empty()), None);
        (harness, backend)
    }

    fn build(config: Config, backend: Arc<dyn KvBackend>, search: Arc<dyn SearchService>, dir: Option<TempDir>) -> Self {
        let remote = Arc::new(MemoryRemote::new());
        let identity = Arc::new(StaticIdentity::signed_in(AUTHOR));
        let runtime = Runtime::with_backend(config, backend, remote.clone(), identity.clone(), search);
        Self {
            runtime,
            remote,
            identity,
            _dir: dir,
        }
    }
}

/// Annotation as another user's client would have written it
pub fn remote_annotation(id: &str, comment: &str) -> Annotation {
    Annotation::new(PAGE, "shared passage", comment, AnchorData::quote(QuoteAnchor::new("", "shared passage", "")))
        .with_id(id)
        .with_author("did:example:bob")
        .with_remote_ref(format!("remote://app.pagenote.annotation/{id}"))
}
