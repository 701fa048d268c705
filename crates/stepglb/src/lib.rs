#![warn(missing_docs)]

//! stepglb: STEP assemblies to binary glTF.
//!
//! A CAD kernel reads the STEP file into a labelled document. The pipeline
//! then walks every occurrence once, tessellates each distinct part once,
//! and writes a GLB scene with one node per occurrence that points at the
//! shared mesh. A final pass makes every material double-sided.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use stepglb::{convert_file, ConvertConfig, StepKernel};
//!
//! let summary = convert_file(
//!     &StepKernel::new(),
//!     Path::new("assembly.step"),
//!     Path::new("assembly.glb"),
//!     &ConvertConfig::default(),
//! )
//! .unwrap();
//! println!("{} nodes, {} meshes", summary.instances, summary.meshes);
//! ```
//!
//! Documents that are already triangulated can be converted without a STEP
//! backend through [`stepglb_kernel::memory`]:
//!
//! ```rust
//! use stepglb::{convert_document, ConvertConfig};
//! use stepglb_kernel::memory::{box_faces, MemoryDocument};
//! use stepglb_kernel::Placement;
//!
//! let mut doc = MemoryDocument::new();
//! let cube = doc.add_shape("#1", box_faces(10.0, 10.0, 10.0));
//! doc.add_free_label("0:1:1:1", Some("Cube"), Some((cube, Placement::identity())));
//!
//! let scene = convert_document(&doc, &ConvertConfig::default()).unwrap();
//! assert_eq!(scene.nodes()[0].name, "occ_0_1_1_1_Cube");
//! ```

pub mod batch;
pub mod config;
mod error;
pub mod export;
pub mod pipeline;
pub mod scene;
pub mod walker;

pub use batch::{
    discover_step_files, output_path_for, run_batch, run_batch_with, BatchEvent, BatchReport,
    FileOutcome,
};
pub use config::{ConfigOverrides, ConversionMode, ConvertConfig};
pub use error::ConvertError;
pub use export::{force_double_sided, scene_to_glb, write_glb};
pub use pipeline::{convert_document, convert_file, ConversionSummary};
pub use scene::{assemble_scene, mesh_base_shape, Scene, SceneMesh, SceneNode};
pub use walker::{resolve_name, walk_occurrences, Occurrence};

pub use stepglb_kernel::{CadDocument, CadKernel, KernelError};
pub use stepglb_kernel_math::Transform;
pub use stepglb_kernel_tessellate::{tessellate, TessellateError, TessellationParams, TriangleMesh};

#[cfg(feature = "step")]
pub use stepglb_kernel_step::StepKernel;
