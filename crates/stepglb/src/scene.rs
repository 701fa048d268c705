//! Scene assembly: cached meshes plus one named instance per occurrence.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use stepglb_kernel::{BaseShape, CadDocument, ShapeIdentity, Transform};
use stepglb_kernel_tessellate::{tessellate, TriangleMesh};

use crate::config::{ConversionMode, ConvertConfig};
use crate::error::ConvertError;
use crate::walker::Occurrence;

/// Name of the single node emitted in single-shape mode.
pub const SINGLE_SHAPE_NODE: &str = "shape";

/// A mesh stored once in a scene.
#[derive(Debug, Clone)]
pub struct SceneMesh {
    /// Mesh name in the exported file.
    pub name: String,
    /// Triangle data, shared with every instance that places it.
    pub mesh: Arc<TriangleMesh>,
}

/// A placed instance of a scene mesh.
#[derive(Debug, Clone)]
pub struct SceneNode {
    /// Unique node name.
    pub name: String,
    /// Index into [`Scene::meshes`].
    pub mesh: usize,
    /// Placement in output units.
    pub transform: Transform,
}

/// Deduplicated meshes and the instances that place them.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    meshes: Vec<SceneMesh>,
    nodes: Vec<SceneNode>,
    names: HashSet<String>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a mesh and return its index.
    pub fn add_mesh(&mut self, name: impl Into<String>, mesh: Arc<TriangleMesh>) -> usize {
        self.meshes.push(SceneMesh {
            name: name.into(),
            mesh,
        });
        self.meshes.len() - 1
    }

    /// Place mesh `mesh` under a node.
    ///
    /// `name` is sanitized and made unique with a numeric suffix; the final
    /// name is returned. Returns `None` and adds nothing when `mesh` is not
    /// an index returned by [`Scene::add_mesh`].
    pub fn add_instance(
        &mut self,
        name: &str,
        mesh: usize,
        transform: Transform,
    ) -> Option<String> {
        if mesh >= self.meshes.len() {
            return None;
        }
        let base = sanitize_node_name(name);
        let mut unique = base.clone();
        let mut suffix = 1;
        while self.names.contains(&unique) {
            suffix += 1;
            unique = format!("{base}_{suffix}");
        }
        self.names.insert(unique.clone());
        self.nodes.push(SceneNode {
            name: unique.clone(),
            mesh,
            transform,
        });
        Some(unique)
    }

    /// Stored meshes.
    pub fn meshes(&self) -> &[SceneMesh] {
        &self.meshes
    }

    /// Placed instances, in insertion order.
    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    /// The mesh a node places.
    pub fn mesh_of(&self, node: &SceneNode) -> &Arc<TriangleMesh> {
        &self.meshes[node.mesh].mesh
    }

    /// Whether the scene places nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Replace the characters node names may not carry (spaces and colons).
pub fn sanitize_node_name(name: &str) -> String {
    name.replace([' ', ':'], "_")
}

/// Node name of an occurrence before sanitizing: `occ_<entry>_<name>`.
pub fn occurrence_node_name(entry: &ShapeIdentity, name: &str) -> String {
    format!("occ_{entry}_{name}")
}

/// Build a scene from walked occurrences.
///
/// Each distinct base shape is tessellated once. Occurrences whose shape
/// fails to tessellate are skipped. Fails with
/// [`ConvertError::NoInstancesExported`] when nothing was placed.
pub fn assemble_scene<D: CadDocument>(
    document: &D,
    occurrences: &[Occurrence<D::Shape>],
    config: &ConvertConfig,
) -> Result<Scene, ConvertError> {
    let scene = match config.mode {
        ConversionMode::Occurrence => assemble_instanced(document, occurrences, config),
        ConversionMode::SingleShape => assemble_merged(document, occurrences, config),
    };
    if scene.is_empty() {
        return Err(ConvertError::NoInstancesExported);
    }
    Ok(scene)
}

/// Tessellate one base shape in output units.
///
/// A shape without any triangles fails with [`ConvertError::EmptyGeometry`].
pub fn mesh_base_shape<D: CadDocument>(
    document: &D,
    base: &BaseShape<D::Shape>,
    config: &ConvertConfig,
) -> Result<TriangleMesh, ConvertError> {
    tessellate(document, &base.shape, &config.tessellation())
        .map_err(|err| ConvertError::tessellation(&base.identity, err))
}

/// Meshes keyed by base-shape identity, private to one document.
struct MeshCache<'a, D: CadDocument> {
    document: &'a D,
    config: &'a ConvertConfig,
    meshes: HashMap<ShapeIdentity, Arc<TriangleMesh>>,
    failed: HashSet<ShapeIdentity>,
}

impl<'a, D: CadDocument> MeshCache<'a, D> {
    fn new(document: &'a D, config: &'a ConvertConfig) -> Self {
        Self {
            document,
            config,
            meshes: HashMap::new(),
            failed: HashSet::new(),
        }
    }

    /// The mesh of `occurrence`'s base shape, and whether it was just built.
    fn get(&mut self, occurrence: &Occurrence<D::Shape>) -> Option<(Arc<TriangleMesh>, bool)> {
        let identity = &occurrence.base.identity;
        if let Some(mesh) = self.meshes.get(identity) {
            return Some((Arc::clone(mesh), false));
        }
        if self.failed.contains(identity) {
            return None;
        }
        match mesh_base_shape(self.document, &occurrence.base, self.config) {
            Ok(mesh) => {
                let mesh = Arc::new(mesh);
                self.meshes.insert(identity.clone(), Arc::clone(&mesh));
                Some((mesh, true))
            }
            Err(err) => {
                log_skip(occurrence, &err);
                self.failed.insert(identity.clone());
                None
            }
        }
    }
}

fn log_skip<S>(occurrence: &Occurrence<S>, err: &ConvertError) {
    match err {
        ConvertError::EmptyGeometry(_) => tracing::debug!(
            entry = %occurrence.entry,
            "skipping {}: {err}",
            occurrence.name
        ),
        other => tracing::warn!(
            entry = %occurrence.entry,
            base = %occurrence.base.identity,
            "skipping {}: {other}",
            occurrence.name
        ),
    }
}

fn assemble_instanced<D: CadDocument>(
    document: &D,
    occurrences: &[Occurrence<D::Shape>],
    config: &ConvertConfig,
) -> Scene {
    let mut cache = MeshCache::new(document, config);
    let mut mesh_index: HashMap<ShapeIdentity, usize> = HashMap::new();
    let mut scene = Scene::new();

    for occurrence in occurrences {
        let Some((mesh, fresh)) = cache.get(occurrence) else {
            continue;
        };
        let index = if fresh {
            let index = scene.add_mesh(sanitize_node_name(occurrence.base.identity.as_str()), mesh);
            mesh_index.insert(occurrence.base.identity.clone(), index);
            index
        } else {
            mesh_index[&occurrence.base.identity]
        };

        let name = occurrence_node_name(&occurrence.entry, &occurrence.name);
        if let Some(node) = scene.add_instance(&name, index, occurrence.transform) {
            log_occurrence(occurrence, &node);
        }
    }

    tracing::debug!("occurrence shapes exported: {}", scene.nodes().len());
    scene
}

fn assemble_merged<D: CadDocument>(
    document: &D,
    occurrences: &[Occurrence<D::Shape>],
    config: &ConvertConfig,
) -> Scene {
    let mut cache = MeshCache::new(document, config);
    let mut merged = TriangleMesh::new();

    for occurrence in occurrences {
        let Some((mesh, _)) = cache.get(occurrence) else {
            continue;
        };
        if occurrence.transform.is_identity() {
            merged.merge(&mesh);
        } else {
            merged.merge(&mesh.transformed(&occurrence.transform));
        }
    }

    let mut scene = Scene::new();
    if !merged.is_empty() {
        let index = scene.add_mesh(SINGLE_SHAPE_NODE, Arc::new(merged));
        scene.add_instance(SINGLE_SHAPE_NODE, index, Transform::identity());
    }
    scene
}

fn log_occurrence<S>(occurrence: &Occurrence<S>, node: &str) {
    let t = occurrence.transform.translation_part();
    let det = occurrence.transform.rotation_determinant();
    tracing::info!(
        entry = %occurrence.entry,
        node,
        "[OCC] {} pos=({:.6}, {:.6}, {:.6}) det(R)={:.6}",
        occurrence.name,
        t.x,
        t.y,
        t.z,
        det
    );
    if !occurrence.transform.is_proper_rotation() {
        tracing::warn!(
            entry = %occurrence.entry,
            "placement of {} is not a proper rotation (det = {det})",
            occurrence.name
        );
    }
}
