//! Document-level kernel interface: labels, occurrence shapes, triangulations.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use stepglb_kernel_math::{Placement, Point3};

use crate::error::KernelError;

/// Opaque identity assigned by the kernel to a label or a base shape.
///
/// Comparable and hashable; the pipeline assumes nothing about its textual
/// form, which is only used for node names and log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeIdentity(Arc<str>);

impl ShapeIdentity {
    /// Wrap a kernel-assigned key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(Arc::from(key.into()))
    }

    /// The textual form of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShapeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShapeIdentity {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// A node in a document's label tree.
///
/// `entry` is the stable identity of the label; `handle` is a backend-private
/// index that only means something to the document that issued the label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    entry: ShapeIdentity,
    handle: usize,
}

impl Label {
    /// Create a label. Intended for kernel backends.
    pub fn new(entry: ShapeIdentity, handle: usize) -> Self {
        Self { entry, handle }
    }

    /// The label's stable entry.
    pub fn entry(&self) -> &ShapeIdentity {
        &self.entry
    }

    /// Backend-private handle.
    pub fn handle(&self) -> usize {
        self.handle
    }
}

/// The shape bound to a label, still carrying its placement.
#[derive(Debug, Clone)]
pub struct OccurrenceShape<S> {
    /// Backend shape handle.
    pub shape: S,
    /// Identity of the geometry with the placement stripped.
    pub base: ShapeIdentity,
    /// Placement of this occurrence, kernel units.
    pub location: Placement,
}

impl<S> OccurrenceShape<S> {
    /// Split into the occurrence placement and the location-free base shape.
    pub fn strip_location(self) -> (Placement, BaseShape<S>) {
        (
            self.location,
            BaseShape {
                identity: self.base,
                shape: self.shape,
            },
        )
    }
}

/// Geometry with its placement reset to identity. Shared by every occurrence
/// that places the same part.
#[derive(Debug, Clone)]
pub struct BaseShape<S> {
    /// Identity used as the mesh cache key.
    pub identity: ShapeIdentity,
    /// Backend shape handle.
    pub shape: S,
}

/// Meshing request passed to the kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshParams {
    /// Maximum chordal deviation, kernel length units.
    pub linear_deflection: f64,
    /// Maximum angular deviation in radians, if bounded.
    pub angular_deflection: Option<f64>,
    /// Interpret `linear_deflection` relative to edge size.
    pub relative: bool,
    /// Allow the kernel to mesh faces in parallel.
    pub parallel: bool,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            linear_deflection: 0.15,
            angular_deflection: Some(0.25),
            relative: false,
            parallel: true,
        }
    }
}

/// Triangulation of one topological face.
///
/// Node positions are expressed in the face's local frame; `location` maps
/// them into the shape's frame. Triangle indices are 1-based, the convention
/// B-rep kernels use for their node arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceTriangulation {
    /// Face placement relative to the shape.
    pub location: Placement,
    /// Node positions, kernel units.
    pub nodes: Vec<Point3>,
    /// 1-based node index triples.
    pub triangles: Vec<[u32; 3]>,
}

impl FaceTriangulation {
    /// A triangulation already expressed in shape coordinates.
    pub fn new(nodes: Vec<Point3>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            location: Placement::identity(),
            nodes,
            triangles,
        }
    }

    /// Attach a face placement.
    pub fn with_location(mut self, location: Placement) -> Self {
        self.location = location;
        self
    }
}

/// A CAD document populated from one input file.
pub trait CadDocument {
    /// Backend shape handle.
    type Shape: Clone;

    /// Root ("free") shape labels, in document order.
    fn free_labels(&self) -> Vec<Label>;

    /// Sub-shape labels directly beneath `label`, in document order.
    fn sub_labels(&self, label: &Label) -> Vec<Label>;

    /// The occurrence shape bound to `label`, or `None` for a null shape.
    fn shape(&self, label: &Label) -> Option<OccurrenceShape<Self::Shape>>;

    /// The label's name annotation, if any.
    fn name(&self, label: &Label) -> Option<String>;

    /// Mesh `shape` and return one entry per topological face, in the
    /// kernel's enumeration order. Faces the kernel could not mesh are `None`.
    fn triangulate(
        &self,
        shape: &Self::Shape,
        params: &MeshParams,
    ) -> Result<Vec<Option<FaceTriangulation>>, KernelError>;
}

/// A CAD kernel able to read STEP files into documents.
pub trait CadKernel {
    /// Document type produced by this kernel.
    type Document: CadDocument;

    /// Short kernel name for log lines.
    fn name(&self) -> &str;

    /// Read and transfer a STEP file into a labelled document.
    fn read_step(&self, path: &Path) -> Result<Self::Document, KernelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_equality_and_hash() {
        let a = ShapeIdentity::new("0:1:1:1");
        let b = ShapeIdentity::from("0:1:1:1");
        let c = ShapeIdentity::new("0:1:1:2");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(a.to_string(), "0:1:1:1");
    }

    #[test]
    fn test_strip_location() {
        let occ = OccurrenceShape {
            shape: 7usize,
            base: ShapeIdentity::new("#42"),
            location: Placement::translation(1.0, 2.0, 3.0),
        };
        let (loc, base) = occ.strip_location();
        assert_eq!(loc, Placement::translation(1.0, 2.0, 3.0));
        assert_eq!(base.identity.as_str(), "#42");
        assert_eq!(base.shape, 7);
    }
}
