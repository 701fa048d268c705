//! Single-file conversion: read, walk, assemble, write, post-process.

use std::path::Path;

use stepglb_kernel::{CadDocument, CadKernel};

use crate::config::ConvertConfig;
use crate::error::ConvertError;
use crate::export::{force_double_sided, write_glb};
use crate::scene::{assemble_scene, Scene};
use crate::walker::walk_occurrences;

/// What one successful conversion produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    /// Nodes written.
    pub instances: usize,
    /// Distinct meshes written.
    pub meshes: usize,
    /// Triangles over all distinct meshes.
    pub triangles: usize,
}

impl ConversionSummary {
    /// Summarize a scene.
    pub fn of(scene: &Scene) -> Self {
        Self {
            instances: scene.nodes().len(),
            meshes: scene.meshes().len(),
            triangles: scene.meshes().iter().map(|m| m.mesh.num_triangles()).sum(),
        }
    }
}

/// Walk `document` and assemble its scene.
pub fn convert_document<D: CadDocument>(
    document: &D,
    config: &ConvertConfig,
) -> Result<Scene, ConvertError> {
    let occurrences = walk_occurrences(document, config);
    tracing::debug!(occurrences = occurrences.len(), "walked label tree");
    assemble_scene(document, &occurrences, config)
}

/// Convert the STEP file at `input` into a GLB file at `output`.
///
/// Nothing is written when reading or assembly fails.
pub fn convert_file<K: CadKernel>(
    kernel: &K,
    input: &Path,
    output: &Path,
    config: &ConvertConfig,
) -> Result<ConversionSummary, ConvertError> {
    tracing::debug!(kernel = kernel.name(), "reading {}", input.display());
    let document = kernel.read_step(input)?;
    let scene = convert_document(&document, config)?;
    drop(document);

    write_glb(&scene, output)?;
    if config.force_double_sided {
        force_double_sided(output)?;
    }

    let summary = ConversionSummary::of(&scene);
    tracing::debug!(
        instances = summary.instances,
        meshes = summary.meshes,
        triangles = summary.triangles,
        "wrote {}",
        output.display()
    );
    Ok(summary)
}
