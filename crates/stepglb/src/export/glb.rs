//! Binary glTF (GLB) writer.
//!
//! One glTF mesh per scene mesh, one node per instance carrying its matrix,
//! one scene listing every node and a single `default` material.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use gltf_json as json;
use gltf_json::validation::Checked::Valid;
use stepglb_kernel_tessellate::TriangleMesh;

use crate::error::ConvertError;
use crate::scene::Scene;

/// Name of the material every primitive references.
pub const DEFAULT_MATERIAL: &str = "default";

const GENERATOR: &str = concat!("stepglb ", env!("CARGO_PKG_VERSION"));
const GLB_MAGIC: &[u8; 4] = b"glTF";
const GLB_VERSION: u32 = 2;
const GLB_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// Packs attribute and index data into one binary buffer, 4-byte aligned.
struct BufferBuilder {
    buffer: Vec<u8>,
    views: Vec<json::buffer::View>,
    accessors: Vec<json::Accessor>,
}

impl BufferBuilder {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            views: Vec::new(),
            accessors: Vec::new(),
        }
    }

    fn push_view(&mut self, offset: usize, target: json::buffer::Target) -> json::Index<json::buffer::View> {
        self.views.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: ((self.buffer.len() - offset) as u64).into(),
            byte_offset: Some((offset as u64).into()),
            byte_stride: None,
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: Some(Valid(target)),
        });
        json::Index::new(self.views.len() as u32 - 1)
    }

    fn push_accessor(
        &mut self,
        view: json::Index<json::buffer::View>,
        count: usize,
        component: json::accessor::ComponentType,
        type_: json::accessor::Type,
        bounds: Option<([f32; 3], [f32; 3])>,
    ) -> json::Index<json::Accessor> {
        let to_value = |v: [f32; 3]| json::Value::Array(v.into_iter().map(json::Value::from).collect());
        let (min, max) = bounds.map_or((None, None), |(min, max)| {
            (Some(to_value(min)), Some(to_value(max)))
        });
        self.accessors.push(json::Accessor {
            buffer_view: Some(view),
            byte_offset: Some(0u64.into()),
            count: count.into(),
            component_type: Valid(json::accessor::GenericComponentType(component)),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(type_),
            min,
            max,
            name: None,
            normalized: false,
            sparse: None,
        });
        json::Index::new(self.accessors.len() as u32 - 1)
    }

    /// Vec3 positions with their bounds (required by glTF for POSITION).
    fn pack_positions(&mut self, positions: &[[f32; 3]]) -> json::Index<json::Accessor> {
        self.pack_f32x3(positions, position_bounds(positions))
    }

    fn pack_vec3(&mut self, data: &[[f32; 3]]) -> json::Index<json::Accessor> {
        self.pack_f32x3(data, None)
    }

    fn pack_f32x3(
        &mut self,
        data: &[[f32; 3]],
        bounds: Option<([f32; 3], [f32; 3])>,
    ) -> json::Index<json::Accessor> {
        let offset = self.buffer.len();
        self.buffer
            .extend(data.iter().flatten().flat_map(|c| c.to_le_bytes()));
        let view = self.push_view(offset, json::buffer::Target::ArrayBuffer);
        pad_to_four(&mut self.buffer, 0);
        self.push_accessor(
            view,
            data.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec3,
            bounds,
        )
    }

    fn pack_indices_u32(&mut self, faces: &[[u32; 3]]) -> json::Index<json::Accessor> {
        let offset = self.buffer.len();
        for f in faces {
            for i in f {
                self.buffer.extend_from_slice(&i.to_le_bytes());
            }
        }
        let view = self.push_view(offset, json::buffer::Target::ElementArrayBuffer);
        pad_to_four(&mut self.buffer, 0);
        self.push_accessor(
            view,
            faces.len() * 3,
            json::accessor::ComponentType::U32,
            json::accessor::Type::Scalar,
            None,
        )
    }
}

/// Material shared by every primitive.
pub fn default_material() -> json::Material {
    json::Material {
        name: Some(DEFAULT_MATERIAL.to_string()),
        double_sided: true,
        ..Default::default()
    }
}

fn build_mesh(buffer: &mut BufferBuilder, name: &str, mesh: &TriangleMesh) -> json::Mesh {
    let positions: Vec<[f32; 3]> = mesh
        .vertices
        .iter()
        .map(|v| [v[0] as f32, v[1] as f32, v[2] as f32])
        .collect();
    let position_accessor = buffer.pack_positions(&positions);
    let normal_accessor = buffer.pack_vec3(&mesh.vertex_normals());
    let index_accessor = buffer.pack_indices_u32(&mesh.faces);

    let mut attributes = BTreeMap::new();
    attributes.insert(Valid(json::mesh::Semantic::Positions), position_accessor);
    attributes.insert(Valid(json::mesh::Semantic::Normals), normal_accessor);

    json::Mesh {
        extensions: Default::default(),
        extras: Default::default(),
        name: Some(name.to_string()),
        primitives: vec![json::mesh::Primitive {
            attributes,
            extensions: Default::default(),
            extras: Default::default(),
            indices: Some(index_accessor),
            material: Some(json::Index::new(0)),
            mode: Valid(json::mesh::Mode::Triangles),
            targets: None,
        }],
        weights: None,
    }
}

/// Build the glTF document and binary buffer for `scene`.
pub fn scene_to_root(scene: &Scene) -> (json::Root, Vec<u8>) {
    let mut buffer = BufferBuilder::new();
    let meshes: Vec<json::Mesh> = scene
        .meshes()
        .iter()
        .map(|m| build_mesh(&mut buffer, &m.name, &m.mesh))
        .collect();

    let nodes: Vec<json::Node> = scene
        .nodes()
        .iter()
        .map(|node| json::Node {
            camera: None,
            children: None,
            extensions: Default::default(),
            extras: Default::default(),
            matrix: (!node.transform.is_identity()).then(|| node.transform.to_gltf_matrix()),
            mesh: Some(json::Index::new(node.mesh as u32)),
            name: Some(node.name.clone()),
            rotation: None,
            scale: None,
            skin: None,
            translation: None,
            weights: None,
        })
        .collect();

    let root = json::Root {
        accessors: buffer.accessors,
        animations: Vec::new(),
        asset: json::Asset {
            copyright: None,
            extensions: Default::default(),
            extras: Default::default(),
            generator: Some(GENERATOR.to_string()),
            min_version: None,
            version: "2.0".to_string(),
        },
        buffers: vec![json::Buffer {
            byte_length: (buffer.buffer.len() as u64).into(),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            uri: None,
        }],
        buffer_views: buffer.views,
        cameras: Vec::new(),
        extensions: Default::default(),
        extensions_required: Vec::new(),
        extensions_used: Vec::new(),
        extras: Default::default(),
        images: Vec::new(),
        materials: vec![default_material()],
        meshes,
        samplers: Vec::new(),
        scene: Some(json::Index::new(0)),
        scenes: vec![json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            name: Some("Scene".to_string()),
            nodes: (0..nodes.len() as u32).map(json::Index::new).collect(),
        }],
        nodes,
        skins: Vec::new(),
        textures: Vec::new(),
    };
    (root, buffer.buffer)
}

/// Encode `scene` as GLB bytes.
pub fn scene_to_glb(scene: &Scene) -> Result<Vec<u8>, ConvertError> {
    let (root, bin) = scene_to_root(scene);
    assemble_glb(&root, &bin)
}

/// Encode `scene` and write it to `path`.
pub fn write_glb(scene: &Scene, path: impl AsRef<Path>) -> Result<(), ConvertError> {
    let bytes = scene_to_glb(scene)?;
    fs::write(path.as_ref(), bytes)?;
    Ok(())
}

/// Frame a glTF document and its binary buffer as GLB.
///
/// The JSON chunk is padded with spaces and the BIN chunk with zeros; an
/// empty buffer produces no BIN chunk.
pub fn assemble_glb(root: &json::Root, buffer_data: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let mut json_chunk = json::serialize::to_string(root)
        .map_err(ConvertError::encoding)?
        .into_bytes();
    pad_to_four(&mut json_chunk, b' ');
    let mut chunks = vec![(CHUNK_JSON, json_chunk)];
    if !buffer_data.is_empty() {
        let mut bin_chunk = buffer_data.to_vec();
        pad_to_four(&mut bin_chunk, 0);
        chunks.push((CHUNK_BIN, bin_chunk));
    }

    let total_length = GLB_HEADER_LEN
        + chunks
            .iter()
            .map(|(_, data)| CHUNK_HEADER_LEN + data.len())
            .sum::<usize>();
    let total = u32::try_from(total_length)
        .map_err(|_| ConvertError::encoding(format!("GLB of {total_length} bytes exceeds 4 GiB")))?;

    let mut glb = Vec::with_capacity(total_length);
    glb.extend_from_slice(GLB_MAGIC);
    glb.extend_from_slice(&GLB_VERSION.to_le_bytes());
    glb.extend_from_slice(&total.to_le_bytes());
    // chunk lengths are bounded by `total`
    for (kind, data) in &chunks {
        glb.extend_from_slice(&(data.len() as u32).to_le_bytes());
        glb.extend_from_slice(&kind.to_le_bytes());
        glb.extend_from_slice(data);
    }
    Ok(glb)
}

/// Grow `buffer` with `fill` to the next 4-byte boundary.
fn pad_to_four(buffer: &mut Vec<u8>, fill: u8) {
    buffer.resize(buffer.len().next_multiple_of(4), fill);
}

/// Axis-aligned `(min, max)` of `positions`, `None` when there are none.
fn position_bounds(positions: &[[f32; 3]]) -> Option<([f32; 3], [f32; 3])> {
    let (first, rest) = positions.split_first()?;
    Some(rest.iter().fold((*first, *first), |(mut lo, mut hi), p| {
        for k in 0..3 {
            lo[k] = lo[k].min(p[k]);
            hi[k] = hi[k].max(p[k]);
        }
        (lo, hi)
    }))
}
