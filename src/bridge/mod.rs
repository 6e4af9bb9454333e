//! Cross-context sync bridge
//!
//! The coordinator owns local storage but cannot reach the remote store.
//! `SyncBridge` forwards typed requests into a worker context hosted by a
//! `WorkerHost` and turns every transport problem into a failure response.

mod client;
mod host;
mod message;

pub use client::{SyncBridge, DEFAULT_IDLE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use host::{EnvelopeHandler, HandlerFactory, HostError, TaskHost, WorkerHost};
pub use message::{
    AnnotationPayload, BridgeError, DeletePayload, DrawingPayload, SyncAllResult, SyncRefResult,
    SyncRequest, SyncResponse, SyncStatus, WORKER_TARGET,
};
