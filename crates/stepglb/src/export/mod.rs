//! GLB output: scene encoding and the material post-pass.

pub mod glb;
pub mod post;

pub use glb::{assemble_glb, scene_to_glb, write_glb, DEFAULT_MATERIAL};
pub use post::{force_double_sided, MaterialFixes};
