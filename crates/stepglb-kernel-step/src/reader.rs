//! STEP reader: parses a file into a labelled [`StepDocument`].

use std::fs;
use std::path::Path;

use stepglb_kernel::{
    CadDocument, CadKernel, FaceTriangulation, KernelError, Label, MeshParams, OccurrenceShape,
    ShapeIdentity,
};
use stepglb_kernel_math::{Placement, Point3};
use truck_meshalgo::prelude::*;
use truck_stepio::r#in::Table;

use crate::assembly;
use crate::entities::EntityIndex;

/// Deflection used when the requested one is not a positive finite number.
const FALLBACK_DEFLECTION: f64 = 0.01;

/// Reads STEP files with `ruststep` and meshes shells with `truck`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepKernel;

impl StepKernel {
    /// Create a STEP kernel.
    pub fn new() -> Self {
        Self
    }
}

impl CadKernel for StepKernel {
    type Document = StepDocument;

    fn name(&self) -> &str {
        "truck"
    }

    fn read_step(&self, path: &Path) -> Result<StepDocument, KernelError> {
        let text = fs::read_to_string(path)?;
        StepDocument::parse(&text, path)
    }
}

#[derive(Debug, Clone)]
struct LabelRecord {
    entry: ShapeIdentity,
    name: Option<String>,
    shape: Option<(u64, Placement)>,
    children: Vec<usize>,
}

/// A STEP file's shells and the label tree recovered from its assembly
/// structure.
///
/// Free labels (`0:1:1:k`) stand for root products and carry no shape of
/// their own; their sub labels (`0:1:1:k:j`) are the solid occurrences
/// beneath them. Shells no product places become free labels with a shape.
pub struct StepDocument {
    table: Table,
    labels: Vec<LabelRecord>,
    roots: Vec<usize>,
}

impl StepDocument {
    /// Parse STEP text. `source` is only used in error messages.
    pub fn parse(text: &str, source: &Path) -> Result<Self, KernelError> {
        let exchange =
            ruststep::parser::parse(text).map_err(|e| KernelError::read(source, e.to_string()))?;
        let section = exchange
            .data
            .first()
            .ok_or_else(|| KernelError::read(source, "no data section"))?;

        let table = Table::from_data_section(section);
        let index = EntityIndex::from_data_section(section);
        if index.is_empty() {
            return Err(KernelError::transfer(source, "data section is empty"));
        }

        let mut shells: Vec<u64> = table.shell.keys().copied().collect();
        shells.sort_unstable();
        tracing::debug!(
            entities = index.len(),
            shells = shells.len(),
            "parsed {}",
            source.display()
        );

        let tree = assembly::build(&index, &shells);
        let mut document = Self {
            table,
            labels: Vec::new(),
            roots: Vec::new(),
        };

        let mut k = 0;
        for root in tree.roots {
            k += 1;
            let parent = document.push_label(format!("0:1:1:{k}"), root.name, None);
            document.roots.push(parent);
            for (j, occurrence) in root.occurrences.into_iter().enumerate() {
                let child = document.push_label(
                    format!("0:1:1:{k}:{}", j + 1),
                    occurrence.name,
                    Some((occurrence.shell, occurrence.location)),
                );
                document.labels[parent].children.push(child);
            }
        }
        for loose in tree.loose_shells {
            k += 1;
            let label = document.push_label(
                format!("0:1:1:{k}"),
                loose.name,
                Some((loose.shell, Placement::identity())),
            );
            document.roots.push(label);
        }

        Ok(document)
    }

    fn push_label(
        &mut self,
        entry: String,
        name: Option<String>,
        shape: Option<(u64, Placement)>,
    ) -> usize {
        self.labels.push(LabelRecord {
            entry: ShapeIdentity::new(entry),
            name,
            shape,
            children: Vec::new(),
        });
        self.labels.len() - 1
    }

    fn label_at(&self, index: usize) -> Label {
        Label::new(self.labels[index].entry.clone(), index)
    }
}

impl CadDocument for StepDocument {
    /// Shell entity id.
    type Shape = u64;

    fn free_labels(&self) -> Vec<Label> {
        self.roots.iter().map(|&i| self.label_at(i)).collect()
    }

    fn sub_labels(&self, label: &Label) -> Vec<Label> {
        self.labels
            .get(label.handle())
            .map(|record| record.children.iter().map(|&i| self.label_at(i)).collect())
            .unwrap_or_default()
    }

    fn shape(&self, label: &Label) -> Option<OccurrenceShape<u64>> {
        let (shell, location) = self.labels.get(label.handle())?.shape?;
        Some(OccurrenceShape {
            shape: shell,
            base: ShapeIdentity::new(format!("#{shell}")),
            location,
        })
    }

    fn name(&self, label: &Label) -> Option<String> {
        self.labels.get(label.handle())?.name.clone()
    }

    fn triangulate(
        &self,
        shell: &u64,
        params: &MeshParams,
    ) -> Result<Vec<Option<FaceTriangulation>>, KernelError> {
        let holder = self
            .table
            .shell
            .get(shell)
            .ok_or_else(|| KernelError::UnknownShape(format!("#{shell}")))?;
        let compressed = self
            .table
            .to_compressed_shell(holder)
            .map_err(|e| KernelError::InvalidTopology(format!("shell #{shell}: {e}")))?;

        if params.angular_deflection.is_some() || params.relative || params.parallel {
            tracing::debug!(
                shell,
                "angular, relative and parallel meshing options are not supported, using chordal tolerance only"
            );
        }
        let tolerance = if params.linear_deflection.is_finite() && params.linear_deflection > 0.0 {
            params.linear_deflection
        } else {
            FALLBACK_DEFLECTION
        };

        let meshed = compressed.robust_triangulation(tolerance);
        Ok(meshed
            .faces
            .iter()
            .map(|face| {
                face.surface.as_ref().map(|surface| {
                    let mesh = match face.orientation {
                        true => surface.clone(),
                        false => surface.inverse(),
                    };
                    face_triangulation(&mesh)
                })
            })
            .collect())
    }
}

/// Copy a face mesh into a 1-based triangulation, splitting quads.
fn face_triangulation(mesh: &PolygonMesh) -> FaceTriangulation {
    let nodes = mesh
        .positions()
        .iter()
        .map(|p| Point3::new(p.x, p.y, p.z))
        .collect();

    let mut triangles: Vec<[u32; 3]> = mesh
        .tri_faces()
        .iter()
        .map(|t| [t[0].pos as u32 + 1, t[1].pos as u32 + 1, t[2].pos as u32 + 1])
        .collect();
    for q in mesh.quad_faces() {
        let [a, b, c, d] = [
            q[0].pos as u32 + 1,
            q[1].pos as u32 + 1,
            q[2].pos as u32 + 1,
            q[3].pos as u32 + 1,
        ];
        triangles.push([a, b, c]);
        triangles.push([a, c, d]);
    }

    FaceTriangulation::new(nodes, triangles)
}
