//! Storage trait definitions

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Capacity reported by backends that do not configure one (10 MiB)
pub const DEFAULT_CAPACITY_BYTES: u64 = 10 * 1024 * 1024;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage quota exceeded: write needs {needed} bytes, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },
}

impl StorageError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for local key-value backends
///
/// Values are JSON text. Each call is atomic: a failed `set` leaves the
/// previous value for the key in place. Implementations must be thread-safe
/// (Send + Sync); callers serialize read-modify-write cycles themselves.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Insert or replace. Fails with `QuotaExceeded` if the write would
    /// push usage past capacity.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove a key, returning whether it existed
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// All keys starting with `prefix`, sorted
    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Remove all keys starting with `prefix`, returning how many were removed
    fn remove_prefix(&self, prefix: &str) -> StorageResult<usize>;

    /// Bytes used by keys and values
    fn bytes_in_use(&self) -> StorageResult<u64>;

    /// Total bytes available
    fn capacity(&self) -> u64;
}

/// Extension trait for opening backends from paths
pub trait OpenBackend: KvBackend + Sized {
    /// Open or create a backend at the given path
    fn open(path: impl AsRef<Path>, capacity: u64) -> StorageResult<Self>;

    /// Create an in-memory backend (useful for testing)
    fn open_in_memory(capacity: u64) -> StorageResult<Self>;
}

/// Storage usage snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaInfo {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub percent_used: f64,
}

impl QuotaInfo {
    pub fn new(used_bytes: u64, total_bytes: u64) -> Self {
        let percent_used = if total_bytes == 0 {
            100.0
        } else {
            used_bytes as f64 / total_bytes as f64 * 100.0
        };
        Self {
            used_bytes,
            total_bytes,
            percent_used,
        }
    }
}

/// Reports how much local storage is in use
pub trait QuotaInspector: Send + Sync {
    fn quota(&self) -> StorageResult<QuotaInfo>;
}

/// Quota read straight from a backend's own accounting
pub struct BackendQuota {
    backend: Arc<dyn KvBackend>,
}

impl BackendQuota {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }
}

impl QuotaInspector for BackendQuota {
    fn quota(&self) -> StorageResult<QuotaInfo> {
        Ok(QuotaInfo::new(self.backend.bytes_in_use()?, self.backend.capacity()))
    }
}
