//! Declarative rewriting of immutable document trees.
//!
//! A [`Document`] is a persistent tree of mappings, sequences and scalars.
//! Edits are expressed as an ordered list of [`Transform`]s, each pairing a
//! [`PathPattern`] with a [`Replacement`], and applied with [`apply`]:
//!
//! ```
//! use s4_transform::{ANY, Document, Selector, TransformBatch, pattern};
//! use serde_json::json;
//!
//! let manifests = Document::from(json!([
//!     {"kind": "Deployment", "spec": {"replicas": 3}},
//!     {"kind": "Service", "spec": {"replicas": 3}},
//! ]));
//!
//! let scaled = TransformBatch::new()
//!     .set(
//!         pattern![Selector::field_equals("kind", "Deployment"), "spec", "replicas"],
//!         1,
//!     )
//!     .apply(&manifests)
//!     .unwrap();
//!
//! assert_eq!(scaled.pointer("/0/spec/replicas").and_then(Document::as_u64), Some(1));
//! assert_eq!(scaled.pointer("/1/spec/replicas").and_then(Document::as_u64), Some(3));
//! ```
//!
//! Patterns are always resolved against the document as it was when the
//! batch started. A [`Selector`] therefore sees the same snapshot no matter
//! how many earlier transforms in the batch touched the fields it inspects.

mod document;
mod engine;
mod path;

pub use document::Document;
pub use engine::{
    BoxedError, Error, Replacement, Transform, TransformBatch, apply, apply_with_snapshot, resolve,
};
pub use path::{ANY, Path, PathKey, PathPattern, Segment, Selector, SelectorContext};
