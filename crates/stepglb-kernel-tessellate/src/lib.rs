#![warn(missing_docs)]

//! Shape to triangle mesh tessellation for the stepglb converter.
//!
//! Converts one untransformed kernel shape into an indexed triangle mesh by:
//! 1. Asking the kernel to mesh the shape with the requested deflections
//! 2. Visiting every face triangulation the kernel produced
//! 3. Moving face nodes through the face's local placement and rescaling them
//! 4. Re-basing the kernel's 1-based triangle indices onto the running vertex list
//!
//! Vertices are not welded: neighbouring faces contribute coincident copies
//! of their shared boundary nodes.

mod normals;

use stepglb_kernel::{CadDocument, KernelError, MeshParams};
use stepglb_kernel_math::{Point3, Transform};
use thiserror::Error;

pub use normals::{NormalsError, NormalsReport};

/// Errors returned by [`tessellate`].
#[derive(Error, Debug)]
pub enum TessellateError {
    /// The kernel produced no triangles for any face of the shape.
    #[error("No triangulation produced for shape")]
    EmptyGeometry,
    /// A face triangulation referenced a node outside its node array.
    #[error("Face {face} references node {index} of {count}")]
    InvalidIndex {
        /// Face position in enumeration order.
        face: usize,
        /// Offending 1-based index.
        index: u32,
        /// Number of nodes in that face.
        count: usize,
    },
    /// The kernel failed to mesh the shape.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Output triangle mesh for scene assembly and export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions in output units.
    pub vertices: Vec<[f64; 3]>,
    /// 0-based triangle index triples.
    pub faces: Vec<[u32; 3]>,
}

impl TriangleMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.faces.len()
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Axis-aligned bounds as `(min, max)`, or `None` for an empty vertex list.
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        let first = *self.vertices.first()?;
        let mut min = first;
        let mut max = first;
        for v in &self.vertices[1..] {
            for i in 0..3 {
                min[i] = min[i].min(v[i]);
                max[i] = max[i].max(v[i]);
            }
        }
        Some((min, max))
    }

    /// Translate every vertex by `offset`.
    pub fn translate(&mut self, offset: [f64; 3]) {
        for v in &mut self.vertices {
            for i in 0..3 {
                v[i] += offset[i];
            }
        }
    }

    /// Move the mesh so its bounding-box minimum sits at the origin.
    ///
    /// Returns the translation that was applied.
    pub fn rezero(&mut self) -> [f64; 3] {
        let Some((min, _)) = self.bounds() else {
            return [0.0; 3];
        };
        let offset = [-min[0], -min[1], -min[2]];
        self.translate(offset);
        offset
    }

    /// A copy of this mesh with every vertex moved through `transform`.
    pub fn transformed(&self, transform: &Transform) -> TriangleMesh {
        let vertices = self
            .vertices
            .iter()
            .map(|v| {
                let p = transform.apply_point(&Point3::new(v[0], v[1], v[2]));
                [p.x, p.y, p.z]
            })
            .collect();
        let mut faces = self.faces.clone();
        if transform.rotation_determinant() < 0.0 {
            for f in &mut faces {
                f.swap(1, 2);
            }
        }
        TriangleMesh { vertices, faces }
    }

    /// Merge another mesh into this one.
    pub fn merge(&mut self, other: &TriangleMesh) {
        let offset = self.num_vertices() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.faces.extend(
            other
                .faces
                .iter()
                .map(|f| [f[0] + offset, f[1] + offset, f[2] + offset]),
        );
    }
}

/// Tessellation parameters controlling mesh density and post-steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TessellationParams {
    /// Maximum chordal deviation, kernel length units.
    pub linear_deflection: f64,
    /// Maximum angular deviation in radians, if bounded.
    pub angular_deflection: Option<f64>,
    /// Scale from kernel units to output units.
    pub unit_scale: f64,
    /// Move each mesh so its bounding-box minimum is the origin.
    pub rezero: bool,
}

impl Default for TessellationParams {
    fn default() -> Self {
        Self {
            linear_deflection: 0.15,
            angular_deflection: Some(0.25),
            unit_scale: 0.001,
            rezero: false,
        }
    }
}

impl TessellationParams {
    /// The meshing request sent to the kernel: absolute deflection, parallel
    /// meshing allowed.
    pub fn mesh_params(&self) -> MeshParams {
        MeshParams {
            linear_deflection: self.linear_deflection,
            angular_deflection: self.angular_deflection,
            relative: false,
            parallel: true,
        }
    }
}

/// Tessellate an untransformed shape into a triangle mesh in output units.
///
/// Faces without a triangulation are skipped. Fails with
/// [`TessellateError::EmptyGeometry`] when no face contributed triangles.
/// Winding repair is attempted and its failure is tolerated.
pub fn tessellate<D: CadDocument>(
    document: &D,
    shape: &D::Shape,
    params: &TessellationParams,
) -> Result<TriangleMesh, TessellateError> {
    let faces = document.triangulate(shape, &params.mesh_params())?;
    let scale = params.unit_scale;
    let mut mesh = TriangleMesh::new();

    for (face_index, face) in faces.iter().enumerate() {
        let Some(face) = face else {
            tracing::trace!(face = face_index, "face has no triangulation");
            continue;
        };

        let offset = mesh.vertices.len() as u32;
        let count = face.nodes.len();
        for node in &face.nodes {
            let p = face.location.apply_point(node);
            mesh.vertices.push([p.x * scale, p.y * scale, p.z * scale]);
        }

        for tri in &face.triangles {
            let mut out = [0u32; 3];
            for (slot, &index) in out.iter_mut().zip(tri.iter()) {
                if index == 0 || index as usize > count {
                    return Err(TessellateError::InvalidIndex {
                        face: face_index,
                        index,
                        count,
                    });
                }
                *slot = index - 1 + offset;
            }
            mesh.faces.push(out);
        }
    }

    if mesh.is_empty() {
        return Err(TessellateError::EmptyGeometry);
    }

    if params.rezero {
        mesh.rezero();
    }

    match mesh.fix_normals() {
        Ok(report) => tracing::trace!(
            components = report.components,
            flipped = report.flipped_triangles,
            "winding repaired"
        ),
        Err(err) => tracing::debug!("keeping kernel winding: {err}"),
    }

    Ok(mesh)
}
