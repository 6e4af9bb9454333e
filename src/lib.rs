//! Pagenote: Content Anchoring & Synchronization Engine
//!
//! Attaches text annotations and freehand drawings to web pages. Every item
//! is saved locally at once and reaches a remote store eventually.
//!
//! # Core Concepts
//!
//! - **Anchors**: prefix/exact/suffix quotes that re-locate a passage after
//!   the page reloads or changes
//! - **Local stores**: per-URL collections with per-key write serialization
//! - **Bridge**: the only path from the coordinator into the worker context
//!   that performs remote writes
//! - **Reconciler**: timer-driven retry of items that have not synced yet
//!
//! # Example
//!
//! ```
//! use pagenote::anchor::{compute_quote, resolve_quote, QuoteOptions, TextRange};
//!
//! let text = "Hello world! Goodbye.";
//! let quote = compute_quote(text, TextRange::new(6, 11), QuoteOptions::default()).unwrap();
//! assert_eq!(resolve_quote(&quote, text), Some(TextRange::new(6, 11)));
//! ```

pub mod anchor;
pub mod bridge;
pub mod config;
mod coordinator;
pub mod identity;
pub mod logging;
pub mod merge;
pub mod model;
pub mod reconciler;
mod runtime;
pub mod storage;
pub mod worker;

pub use coordinator::{Coordinator, PagenoteError, PagenoteResult, SaveOutcome, SyncState};
pub use model::{AnchorData, Annotation, Drawing, ItemId, NewAnnotation, NewDrawing, QuoteAnchor};
pub use reconciler::{Reconciler, ReconcilerHandle, TickOutcome};
pub use runtime::Runtime;
pub use storage::{KvBackend, OpenBackend, SqliteBackend, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
