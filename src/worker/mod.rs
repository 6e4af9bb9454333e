//! Remote sync worker
//!
//! Runs inside the worker context and is the only part of the system that
//! talks to the remote store.

mod record;
mod remote;
mod sync;

pub use record::{decode_canvas, drawing_path, AnnotationRecord, CanvasBlob, ANNOTATION_COLLECTION};
pub use remote::{blob_ref, record_ref, DirRemote, MemoryRemote, RemoteError, RemoteResult, RemoteStore};
pub use sync::RemoteSyncWorker;

use crate::storage::StorageError;
use thiserror::Error;

/// Errors while handling a worker request
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("local storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
