//! Local storage for pagenote
//!
//! Backends implement the `KvBackend` trait. The primary implementation is
//! `SqliteBackend`; `MemoryBackend` serves tests. The annotation and drawing
//! stores layer per-URL collections and write serialization on top.

mod annotations;
mod drawings;
mod lock;
mod memory;
mod sqlite;
mod traits;

pub use annotations::LocalAnnotationStore;
pub use drawings::{LocalDrawingStore, QuotaLevel, QuotaThresholds};
pub use lock::{KeyGuard, KeyLocks, StoreGuard};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use traits::{
    BackendQuota, KvBackend, OpenBackend, QuotaInfo, QuotaInspector, StorageError, StorageResult,
    DEFAULT_CAPACITY_BYTES,
};
