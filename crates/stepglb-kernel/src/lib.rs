#![warn(missing_docs)]

//! CAD kernel abstraction for the stepglb converter.
//!
//! The converter never parses STEP or triangulates surfaces itself. It talks
//! to a kernel through two traits:
//!
//! - [`CadKernel`] reads a file into a document.
//! - [`CadDocument`] exposes the labelled shape tree, per-label occurrence
//!   shapes with their placements, display names, and face triangulations.
//!
//! Identities handed out by a kernel are opaque [`ShapeIdentity`] values; the
//! pipeline relies only on their equality and hash within one document.
//!
//! The [`memory`] module provides an in-memory document for callers that
//! already hold triangulated B-rep data, and for tests.
//!
//! # Example
//!
//! ```
//! use stepglb_kernel::memory::{box_faces, MemoryDocument};
//! use stepglb_kernel::{CadDocument, Placement};
//!
//! let mut doc = MemoryDocument::new();
//! let part = doc.add_shape("0:1:1:1", box_faces(10.0, 10.0, 10.0));
//! doc.add_free_label("0:1:1:1", Some("Bracket"), Some((part, Placement::identity())));
//!
//! assert_eq!(doc.free_labels().len(), 1);
//! ```

mod document;
mod error;
pub mod memory;

pub use document::{
    BaseShape, CadDocument, CadKernel, FaceTriangulation, Label, MeshParams, OccurrenceShape,
    ShapeIdentity,
};
pub use error::KernelError;
pub use stepglb_kernel_math::{Placement, Point3, Transform, Vec3};
