//! In-place material pass over a written GLB file.

use std::fs;
use std::path::Path;

use gltf_json as json;

use super::glb::{assemble_glb, default_material};
use crate::error::ConvertError;

/// Counts of what [`force_double_sided_root`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialFixes {
    /// A `default` material was added because the file had none.
    pub added_default: bool,
    /// Materials switched from single- to double-sided.
    pub made_double_sided: usize,
    /// Primitives that had no material and now use the first one.
    pub assigned_primitives: usize,
}

impl MaterialFixes {
    /// Whether the document was already in the target state.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Make every material double-sided and give every primitive a material.
pub fn force_double_sided_root(root: &mut json::Root) -> MaterialFixes {
    let mut fixes = MaterialFixes::default();
    if root.materials.is_empty() {
        root.materials.push(default_material());
        fixes.added_default = true;
    }
    for material in &mut root.materials {
        if !material.double_sided {
            material.double_sided = true;
            fixes.made_double_sided += 1;
        }
    }
    for primitive in root.meshes.iter_mut().flat_map(|m| m.primitives.iter_mut()) {
        if primitive.material.is_none() {
            primitive.material = Some(json::Index::new(0));
            fixes.assigned_primitives += 1;
        }
    }
    fixes
}

/// Load the GLB at `path`, apply [`force_double_sided_root`] and save it in
/// place. Running it twice leaves the file unchanged the second time.
pub fn force_double_sided(path: impl AsRef<Path>) -> Result<MaterialFixes, ConvertError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let glb = gltf::Glb::from_slice(&bytes).map_err(ConvertError::encoding)?;
    let mut root = json::Root::from_slice(&glb.json).map_err(ConvertError::encoding)?;

    let fixes = force_double_sided_root(&mut root);
    if fixes.is_noop() {
        tracing::debug!("{}: materials already double-sided", path.display());
        return Ok(fixes);
    }

    let bin = glb.bin.as_deref().unwrap_or_default();
    let out = assemble_glb(&root, bin)?;
    fs::write(path, out)?;
    tracing::debug!(
        added_default = fixes.added_default,
        double_sided = fixes.made_double_sided,
        assigned = fixes.assigned_primitives,
        "{}: materials fixed",
        path.display()
    );
    Ok(fixes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::glb::scene_to_root;
    use crate::scene::Scene;
    use std::sync::Arc;
    use stepglb_kernel::Transform;
    use stepglb_kernel_tessellate::TriangleMesh;

    fn bare_root() -> (json::Root, Vec<u8>) {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(
            "tri",
            Arc::new(TriangleMesh {
                vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                faces: vec![[0, 1, 2]],
            }),
        );
        scene.add_instance("a", mesh, Transform::identity());
        let (mut root, bin) = scene_to_root(&scene);
        root.materials.clear();
        for primitive in root.meshes.iter_mut().flat_map(|m| m.primitives.iter_mut()) {
            primitive.material = None;
        }
        (root, bin)
    }

    #[test]
    fn test_fixes_bare_document() {
        let (mut root, _) = bare_root();
        let fixes = force_double_sided_root(&mut root);
        assert!(fixes.added_default);
        assert_eq!(fixes.made_double_sided, 0);
        assert_eq!(fixes.assigned_primitives, 1);
        assert_eq!(root.materials[0].name.as_deref(), Some("default"));
        assert!(root.materials[0].double_sided);
        assert_eq!(root.meshes[0].primitives[0].material.map(|i| i.value()), Some(0));
    }

    #[test]
    fn test_single_sided_material_flipped() {
        let (mut root, _) = bare_root();
        root.materials.push(json::Material {
            name: Some("paint".to_string()),
            ..Default::default()
        });
        let fixes = force_double_sided_root(&mut root);
        assert!(!fixes.added_default);
        assert_eq!(fixes.made_double_sided, 1);
        assert_eq!(root.materials.len(), 1);
        assert!(force_double_sided_root(&mut root).is_noop());
    }

    #[test]
    fn test_file_is_a_fixed_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.glb");
        let (root, bin) = bare_root();
        fs::write(&path, assemble_glb(&root, &bin).unwrap()).unwrap();

        let first = force_double_sided(&path).unwrap();
        assert!(!first.is_noop());
        let after_first = fs::read(&path).unwrap();

        let second = force_double_sided(&path).unwrap();
        assert!(second.is_noop());
        assert_eq!(fs::read(&path).unwrap(), after_first);

        let (document, _, _) = gltf::import(&path).unwrap();
        let material = document.materials().next().unwrap();
        assert!(material.double_sided());
        for primitive in document.meshes().flat_map(|m| m.primitives()) {
            assert_eq!(primitive.material().index(), Some(0));
        }
    }

    #[test]
    fn test_not_a_glb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.glb");
        fs::write(&path, b"definitely not binary glTF").unwrap();
        assert!(matches!(
            force_double_sided(&path),
            Err(ConvertError::EncodingFailure(_))
        ));
        assert!(matches!(
            force_double_sided(dir.path().join("missing.glb")),
            Err(ConvertError::Io(_))
        ));
    }
}
