//! Remote store collaborator
//!
//! Two implementations:
//! - `DirRemote`: writes records and blobs under a local directory that acts
//!   as a relay for the real remote store (CLI)
//! - `MemoryRemote`: keeps everything in memory and can be told to fail (testing)

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use uuid::Uuid;

const SCHEME: &str = "remote://";

/// Errors from remote store operations
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote store rejected the write: {0}")]
    Rejected(String),

    #[error("remote record not found: {0}")]
    NotFound(String),

    #[error("invalid remote reference: {0}")]
    InvalidRef(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Durable remote store for synced items.
///
/// References returned by the put operations are opaque to callers and have
/// the form `remote://<collection-or-path>/<key>`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Write a JSON record into `collection`, returning its reference
    async fn put_record(&self, collection: &str, record: Value) -> RemoteResult<String>;

    /// Write a binary payload at `path`, replacing whatever was there
    async fn put_blob(&self, path: &str, bytes: Vec<u8>, mime: &str) -> RemoteResult<String>;

    async fn delete(&self, remote_ref: &str) -> RemoteResult<()>;
}

pub fn record_ref(collection: &str, key: &str) -> String {
    format!("{SCHEME}{collection}/{key}")
}

pub fn blob_ref(path: &str) -> String {
    format!("{SCHEME}{path}")
}

/// Relative location a reference points at, rejecting anything that could
/// escape the store root
fn ref_location(remote_ref: &str) -> RemoteResult<PathBuf> {
    let rest = remote_ref
        .strip_prefix(SCHEME)
        .ok_or_else(|| RemoteError::InvalidRef(remote_ref.to_string()))?;
    safe_relative(rest).ok_or_else(|| RemoteError::InvalidRef(remote_ref.to_string()))
}

fn safe_relative(path: &str) -> Option<PathBuf> {
    let path = Path::new(path);
    let mut components = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => components += 1,
            _ => return None,
        }
    }
    (components > 0).then(|| path.to_path_buf())
}

/// In-memory remote for tests
#[derive(Debug, Default)]
pub struct MemoryRemote {
    records: DashMap<String, Value>,
    blobs: DashMap<String, (Vec<u8>, String)>,
    failing: AtomicBool,
    put_calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of put attempts, including failed ones
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn record(&self, remote_ref: &str) -> Option<Value> {
        self.records.get(remote_ref).map(|r| r.value().clone())
    }

    pub fn blob(&self, remote_ref: &str) -> Option<(Vec<u8>, String)> {
        self.blobs.get(remote_ref).map(|b| b.value().clone())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    fn check(&self) -> RemoteResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected("memory remote configured to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn put_record(&self, collection: &str, record: Value) -> RemoteResult<String> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let remote_ref = record_ref(collection, &Uuid::new_v4().to_string());
        self.records.insert(remote_ref.clone(), record);
        Ok(remote_ref)
    }

    async fn put_blob(&self, path: &str, bytes: Vec<u8>, mime: &str) -> RemoteResult<String> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let remote_ref = blob_ref(path);
        self.blobs.insert(remote_ref.clone(), (bytes, mime.to_string()));
        Ok(remote_ref)
    }

    async fn delete(&self, remote_ref: &str) -> RemoteResult<()> {
        self.check()?;
        let removed = self.records.remove(remote_ref).is_some() | self.blobs.remove(remote_ref).is_some();
        if removed {
            Ok(())
        } else {
            Err(RemoteError::NotFound(remote_ref.to_string()))
        }
    }
}

/// Remote relay backed by a directory.
///
/// Records land in `<root>/<collection>/<key>.json`, blobs at
/// `<root>/<path>`.
#[derive(Debug, Clone)]
pub struct DirRemote {
    root: PathBuf,
}

impl DirRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn write(&self, relative: &Path, bytes: &[u8]) -> RemoteResult<()> {
        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for DirRemote {
    async fn put_record(&self, collection: &str, record: Value) -> RemoteResult<String> {
        let key = Uuid::new_v4().to_string();
        let dir = safe_relative(collection).ok_or_else(|| RemoteError::Rejected(format!("bad collection {collection}")))?;
        let bytes = serde_json::to_vec_pretty(&record)?;
        self.write(&dir.join(format!("{key}.json")), &bytes).await?;
        Ok(record_ref(collection, &key))
    }

    async fn put_blob(&self, path: &str, bytes: Vec<u8>, _mime: &str) -> RemoteResult<String> {
        let relative = safe_relative(path).ok_or_else(|| RemoteError::Rejected(format!("bad path {path}")))?;
        self.write(&relative, &bytes).await?;
        Ok(blob_ref(path))
    }

    async fn delete(&self, remote_ref: &str) -> RemoteResult<()> {
        let relative = ref_location(remote_ref)?;
        let mut record = relative.clone().into_os_string();
        record.push(".json");
        for candidate in [PathBuf::from(record), relative] {
            match tokio::fs::remove_file(self.root.join(&candidate)).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RemoteError::NotFound(remote_ref.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_remote_counts_and_fails_on_demand() {
        let remote = MemoryRemote::new();
        let r = remote.put_record("app.test", json!({"a": 1})).await.unwrap();
        assert!(r.starts_with("remote://app.test/"));
        assert_eq!(remote.record(&r), Some(json!({"a": 1})));

        remote.set_failing(true);
        assert!(matches!(
            remote.put_blob("drawings/x.png", vec![1], "image/png").await,
            Err(RemoteError::Rejected(_))
        ));
        assert_eq!(remote.put_calls(), 2);

        remote.set_failing(false);
        remote.delete(&r).await.unwrap();
        assert!(matches!(remote.delete(&r).await, Err(RemoteError::NotFound(_))));
    }

    #[tokio::test]
    async fn dir_remote_writes_and_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let remote = DirRemote::new(dir.path());

        let r = remote.put_record("app.test", json!({"a": 1})).await.unwrap();
        let key = r.rsplit('/').next().unwrap();
        let file = dir.path().join("app.test").join(format!("{key}.json"));
        assert!(file.exists());

        let b = remote.put_blob("drawings/page.png", vec![137, 80], "image/png").await.unwrap();
        assert_eq!(b, "remote://drawings/page.png");
        assert_eq!(std::fs::read(dir.path().join("drawings/page.png")).unwrap(), vec![137, 80]);

        remote.delete(&r).await.unwrap();
        remote.delete(&b).await.unwrap();
        assert!(!file.exists());
        assert!(matches!(remote.delete(&b).await, Err(RemoteError::NotFound(_))));
    }

    #[tokio::test]
    async fn dir_remote_refuses_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let remote = DirRemote::new(dir.path());
        assert!(remote.put_blob("../outside.png", vec![], "image/png").await.is_err());
        assert!(matches!(
            remote.delete("remote://../../etc/passwd").await,
            Err(RemoteError::InvalidRef(_))
        ));
        assert!(matches!(remote.delete("https://elsewhere/x").await, Err(RemoteError::InvalidRef(_))));
    }
}
