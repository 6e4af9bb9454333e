//! Page-attached content: annotations and drawings
//!
//! Both entities are keyed by a normalized page URL. After creation the only
//! field that ever changes is `remote_ref`, which marks the item as synced.

mod annotation;
mod drawing;
mod id;
mod validate;

pub use annotation::{AnchorData, Annotation, NewAnnotation, PathAnchor, QuoteAnchor};
pub use drawing::{Drawing, NewDrawing};
pub use id::ItemId;
pub use validate::{normalize_url, validate_annotation, validate_drawing, Limits, ValidationError};
