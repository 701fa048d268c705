//! In-memory CAD documents.
//!
//! [`MemoryDocument`] holds a label tree and pre-triangulated shapes built
//! through a small builder API. [`MemoryKernel`] serves such documents by
//! file name, so code written against [`CadKernel`] can run without a STEP
//! backend.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;

use stepglb_kernel_math::{Placement, Point3};

use crate::document::{
    CadDocument, CadKernel, FaceTriangulation, Label, MeshParams, OccurrenceShape, ShapeIdentity,
};
use crate::error::KernelError;

/// Handle to a shape stored in a [`MemoryDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeHandle(usize);

#[derive(Debug, Clone)]
struct LabelRecord {
    entry: ShapeIdentity,
    name: Option<String>,
    shape: Option<(ShapeHandle, Placement)>,
    children: Vec<usize>,
}

#[derive(Debug, Clone)]
struct ShapeRecord {
    identity: ShapeIdentity,
    faces: Vec<Option<FaceTriangulation>>,
}

/// A label tree with pre-triangulated shapes.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    labels: Vec<LabelRecord>,
    roots: Vec<usize>,
    shapes: Vec<ShapeRecord>,
    mesh_calls: Cell<usize>,
}

impl MemoryDocument {
    /// Create an empty document (no free shapes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a shape given as one optional triangulation per face.
    pub fn add_shape(
        &mut self,
        identity: impl Into<String>,
        faces: Vec<Option<FaceTriangulation>>,
    ) -> ShapeHandle {
        self.shapes.push(ShapeRecord {
            identity: ShapeIdentity::new(identity),
            faces,
        });
        ShapeHandle(self.shapes.len() - 1)
    }

    /// Add a root label.
    pub fn add_free_label(
        &mut self,
        entry: impl Into<String>,
        name: Option<&str>,
        shape: Option<(ShapeHandle, Placement)>,
    ) -> Label {
        let label = self.push_label(entry, name, shape);
        self.roots.push(label.handle());
        label
    }

    /// Add a sub-shape label beneath `parent`.
    pub fn add_sub_label(
        &mut self,
        parent: &Label,
        entry: impl Into<String>,
        name: Option<&str>,
        shape: Option<(ShapeHandle, Placement)>,
    ) -> Label {
        let label = self.push_label(entry, name, shape);
        self.labels[parent.handle()].children.push(label.handle());
        label
    }

    /// Make an existing label reachable from a second parent as well.
    pub fn attach_sub_label(&mut self, parent: &Label, label: &Label) {
        self.labels[parent.handle()].children.push(label.handle());
    }

    /// Number of [`CadDocument::triangulate`] calls served so far.
    pub fn mesh_calls(&self) -> usize {
        self.mesh_calls.get()
    }

    fn push_label(
        &mut self,
        entry: impl Into<String>,
        name: Option<&str>,
        shape: Option<(ShapeHandle, Placement)>,
    ) -> Label {
        self.labels.push(LabelRecord {
            entry: ShapeIdentity::new(entry),
            name: name.map(str::to_string),
            shape,
            children: Vec::new(),
        });
        self.label_at(self.labels.len() - 1)
    }

    fn label_at(&self, index: usize) -> Label {
        Label::new(self.labels[index].entry.clone(), index)
    }
}

impl CadDocument for MemoryDocument {
    type Shape = ShapeHandle;

    fn free_labels(&self) -> Vec<Label> {
        self.roots.iter().map(|&i| self.label_at(i)).collect()
    }

    fn sub_labels(&self, label: &Label) -> Vec<Label> {
        self.labels
            .get(label.handle())
            .map(|record| record.children.iter().map(|&i| self.label_at(i)).collect())
            .unwrap_or_default()
    }

    fn shape(&self, label: &Label) -> Option<OccurrenceShape<ShapeHandle>> {
        let (handle, location) = self.labels.get(label.handle())?.shape?;
        let record = self.shapes.get(handle.0)?;
        Some(OccurrenceShape {
            shape: handle,
            base: record.identity.clone(),
            location,
        })
    }

    fn name(&self, label: &Label) -> Option<String> {
        self.labels.get(label.handle())?.name.clone()
    }

    fn triangulate(
        &self,
        shape: &ShapeHandle,
        _params: &MeshParams,
    ) -> Result<Vec<Option<FaceTriangulation>>, KernelError> {
        self.mesh_calls.set(self.mesh_calls.get() + 1);
        self.shapes
            .get(shape.0)
            .map(|record| record.faces.clone())
            .ok_or_else(|| KernelError::UnknownShape(format!("{shape:?}")))
    }
}

/// Serves [`MemoryDocument`]s by input file name.
#[derive(Debug, Clone, Default)]
pub struct MemoryKernel {
    documents: HashMap<String, MemoryDocument>,
}

impl MemoryKernel {
    /// Create a kernel with no registered documents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the document returned when a file named `file_name` is read.
    pub fn insert(&mut self, file_name: impl Into<String>, document: MemoryDocument) {
        self.documents.insert(file_name.into(), document);
    }
}

impl CadKernel for MemoryKernel {
    type Document = MemoryDocument;

    fn name(&self) -> &str {
        "memory"
    }

    fn read_step(&self, path: &Path) -> Result<MemoryDocument, KernelError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.documents
            .get(file_name)
            .cloned()
            .ok_or_else(|| KernelError::read(path, "no document registered"))
    }
}

/// Triangulated faces of an axis-aligned box spanning `(0,0,0)..(dx,dy,dz)`.
///
/// Six faces of two triangles each, wound counter-clockwise seen from
/// outside, with 1-based indices and no shared nodes between faces.
pub fn box_faces(dx: f64, dy: f64, dz: f64) -> Vec<Option<FaceTriangulation>> {
    const FORWARD: [[u32; 3]; 2] = [[1, 2, 3], [1, 3, 4]];
    const REVERSED: [[u32; 3]; 2] = [[1, 3, 2], [1, 4, 3]];

    let quads: [([[f64; 3]; 4], [[u32; 3]; 2]); 6] = [
        // -Z
        ([[0.0, 0.0, 0.0], [dx, 0.0, 0.0], [dx, dy, 0.0], [0.0, dy, 0.0]], REVERSED),
        // +Z
        ([[0.0, 0.0, dz], [dx, 0.0, dz], [dx, dy, dz], [0.0, dy, dz]], FORWARD),
        // -Y
        ([[0.0, 0.0, 0.0], [dx, 0.0, 0.0], [dx, 0.0, dz], [0.0, 0.0, dz]], FORWARD),
        // +Y
        ([[0.0, dy, 0.0], [dx, dy, 0.0], [dx, dy, dz], [0.0, dy, dz]], REVERSED),
        // -X
        ([[0.0, 0.0, 0.0], [0.0, dy, 0.0], [0.0, dy, dz], [0.0, 0.0, dz]], REVERSED),
        // +X
        ([[dx, 0.0, 0.0], [dx, dy, 0.0], [dx, dy, dz], [dx, 0.0, dz]], FORWARD),
    ];

    quads
        .iter()
        .map(|(corners, triangles)| {
            let nodes = corners
                .iter()
                .map(|c| Point3::new(c[0], c[1], c[2]))
                .collect();
            Some(FaceTriangulation::new(nodes, triangles.to_vec()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_part_document() -> (MemoryDocument, Label) {
        let mut doc = MemoryDocument::new();
        let part = doc.add_shape("#10", box_faces(1.0, 1.0, 1.0));
        let root = doc.add_free_label("0:1:1:1", Some("Assembly"), None);
        doc.add_sub_label(
            &root,
            "0:1:1:1:1",
            Some("Pin"),
            Some((part, Placement::identity())),
        );
        doc.add_sub_label(
            &root,
            "0:1:1:1:2",
            None,
            Some((part, Placement::translation(5.0, 0.0, 0.0))),
        );
        (doc, root)
    }

    #[test]
    fn test_tree_navigation() {
        let (doc, root) = two_part_document();
        assert_eq!(doc.free_labels(), vec![root.clone()]);

        let subs = doc.sub_labels(&root);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].entry().as_str(), "0:1:1:1:1");
        assert_eq!(doc.name(&subs[0]).as_deref(), Some("Pin"));
        assert_eq!(doc.name(&subs[1]), None);
        assert!(doc.shape(&root).is_none());

        let a = doc.shape(&subs[0]).unwrap();
        let b = doc.shape(&subs[1]).unwrap();
        assert_eq!(a.base, b.base);
        assert_eq!(b.location, Placement::translation(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_triangulate_counts_calls() {
        let (doc, root) = two_part_document();
        let sub = &doc.sub_labels(&root)[0];
        let shape = doc.shape(sub).unwrap().shape;

        let faces = doc.triangulate(&shape, &MeshParams::default()).unwrap();
        assert_eq!(faces.len(), 6);
        assert_eq!(doc.mesh_calls(), 1);
    }

    #[test]
    fn test_box_faces_layout() {
        let faces = box_faces(2.0, 3.0, 4.0);
        let nodes: usize = faces.iter().flatten().map(|f| f.nodes.len()).sum();
        let tris: usize = faces.iter().flatten().map(|f| f.triangles.len()).sum();
        assert_eq!(nodes, 24);
        assert_eq!(tris, 12);
        for face in faces.iter().flatten() {
            for tri in &face.triangles {
                assert!(tri.iter().all(|&i| i >= 1 && i as usize <= face.nodes.len()));
            }
        }
    }

    #[test]
    fn test_kernel_lookup_by_file_name() {
        let (doc, _) = two_part_document();
        let mut kernel = MemoryKernel::new();
        kernel.insert("bracket.step", doc);

        let loaded = kernel.read_step(Path::new("/tmp/somewhere/bracket.step")).unwrap();
        assert_eq!(loaded.free_labels().len(), 1);

        let missing = kernel.read_step(Path::new("other.stp"));
        assert!(matches!(missing, Err(KernelError::Read { .. })));
    }
}
