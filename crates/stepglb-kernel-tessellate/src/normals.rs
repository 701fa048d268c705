//! Winding repair and vertex normals.
//!
//! Face triangulations arrive unwelded, so coincident boundary nodes are
//! matched by quantized position before adjacency is built.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use crate::TriangleMesh;

/// Positions closer than this (output units) are treated as the same vertex.
const WELD_RESOLUTION: f64 = 1e-8;

/// Why the winding of a mesh could not be made consistent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalsError {
    /// An edge is shared by more than two triangles.
    #[error("edge ({0}, {1}) is shared by more than two triangles")]
    NonManifold(u32, u32),
    /// A connected component admits no consistent orientation.
    #[error("mesh is not orientable")]
    NonOrientable,
}

/// Outcome of a successful [`TriangleMesh::fix_normals`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalsReport {
    /// Edge-connected triangle components.
    pub components: usize,
    /// Components that are closed (every edge shared by two triangles).
    pub closed_components: usize,
    /// Triangles whose winding was reversed.
    pub flipped_triangles: usize,
}

type EdgeKey = (u32, u32);

impl TriangleMesh {
    /// Make triangle winding consistent within each connected component and
    /// point closed components outward.
    ///
    /// On error the mesh is left exactly as it was.
    pub fn fix_normals(&mut self) -> Result<NormalsReport, NormalsError> {
        let welded = weld(&self.vertices);
        let corners: Vec<[u32; 3]> = self
            .faces
            .iter()
            .map(|f| [welded[f[0] as usize], welded[f[1] as usize], welded[f[2] as usize]])
            .collect();

        // undirected edge -> (triangle, traversed low-to-high)
        let mut edges: HashMap<EdgeKey, Vec<(usize, bool)>> = HashMap::new();
        for (t, c) in corners.iter().enumerate() {
            if c[0] == c[1] || c[1] == c[2] || c[0] == c[2] {
                continue;
            }
            for k in 0..3 {
                let (a, b) = (c[k], c[(k + 1) % 3]);
                let entry = edges.entry((a.min(b), a.max(b))).or_default();
                entry.push((t, a < b));
                if entry.len() > 2 {
                    return Err(NormalsError::NonManifold(a.min(b), a.max(b)));
                }
            }
        }

        let mut flip: Vec<Option<bool>> = vec![None; corners.len()];
        let mut report = NormalsReport::default();
        let mut queue = VecDeque::new();

        for seed in 0..corners.len() {
            if flip[seed].is_some() {
                continue;
            }
            flip[seed] = Some(false);
            queue.push_back(seed);
            let mut members = Vec::new();
            let mut closed = true;

            while let Some(t) = queue.pop_front() {
                members.push(t);
                let ft = flip[t].unwrap_or(false);
                let c = corners[t];
                if c[0] == c[1] || c[1] == c[2] || c[0] == c[2] {
                    continue;
                }
                for k in 0..3 {
                    let (a, b) = (c[k], c[(k + 1) % 3]);
                    let shared = &edges[&(a.min(b), a.max(b))];
                    if shared.len() < 2 {
                        closed = false;
                        continue;
                    }
                    let dir_t = a < b;
                    for &(n, dir_n) in shared {
                        if n == t {
                            continue;
                        }
                        // neighbours must traverse the shared edge in opposite directions
                        let wanted = dir_n == (dir_t ^ ft);
                        match flip[n] {
                            None => {
                                flip[n] = Some(wanted);
                                queue.push_back(n);
                            }
                            Some(existing) if existing != wanted => {
                                return Err(NormalsError::NonOrientable);
                            }
                            Some(_) => {}
                        }
                    }
                }
            }

            report.components += 1;
            if closed {
                report.closed_components += 1;
                let volume: f64 = members
                    .iter()
                    .map(|&t| self.signed_volume_term(t, flip[t].unwrap_or(false)))
                    .sum();
                if volume < 0.0 {
                    for &t in &members {
                        flip[t] = flip[t].map(|f| !f);
                    }
                }
            }
        }

        for (face, f) in self.faces.iter_mut().zip(&flip) {
            if f.unwrap_or(false) {
                face.swap(1, 2);
                report.flipped_triangles += 1;
            }
        }
        Ok(report)
    }

    /// Area-weighted per-vertex normals, unit length.
    ///
    /// Vertices not referenced by any non-degenerate triangle get `+Z`.
    pub fn vertex_normals(&self) -> Vec<[f32; 3]> {
        let mut acc = vec![[0.0f64; 3]; self.vertices.len()];
        for f in &self.faces {
            let n = self.face_cross(f);
            for &i in f {
                let slot = &mut acc[i as usize];
                for k in 0..3 {
                    slot[k] += n[k];
                }
            }
        }
        acc.iter()
            .map(|n| {
                let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
                if len > 0.0 {
                    [(n[0] / len) as f32, (n[1] / len) as f32, (n[2] / len) as f32]
                } else {
                    [0.0, 0.0, 1.0]
                }
            })
            .collect()
    }

    /// Signed volume enclosed by the mesh (positive for outward winding).
    pub fn signed_volume(&self) -> f64 {
        (0..self.faces.len())
            .map(|t| self.signed_volume_term(t, false))
            .sum()
    }

    fn signed_volume_term(&self, t: usize, flipped: bool) -> f64 {
        let f = self.faces[t];
        let a = self.vertices[f[0] as usize];
        let (b, c) = if flipped {
            (self.vertices[f[2] as usize], self.vertices[f[1] as usize])
        } else {
            (self.vertices[f[1] as usize], self.vertices[f[2] as usize])
        };
        let cross = [
            b[1] * c[2] - b[2] * c[1],
            b[2] * c[0] - b[0] * c[2],
            b[0] * c[1] - b[1] * c[0],
        ];
        (a[0] * cross[0] + a[1] * cross[1] + a[2] * cross[2]) / 6.0
    }

    fn face_cross(&self, f: &[u32; 3]) -> [f64; 3] {
        let a = self.vertices[f[0] as usize];
        let b = self.vertices[f[1] as usize];
        let c = self.vertices[f[2] as usize];
        let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ]
    }
}

/// Map each vertex to the first vertex sharing its quantized position.
fn weld(vertices: &[[f64; 3]]) -> Vec<u32> {
    let mut seen: HashMap<[i64; 3], u32> = HashMap::with_capacity(vertices.len());
    vertices
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let key = [
                (v[0] / WELD_RESOLUTION).round() as i64,
                (v[1] / WELD_RESOLUTION).round() as i64,
                (v[2] / WELD_RESOLUTION).round() as i64,
            ];
            *seen.entry(key).or_insert(i as u32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> TriangleMesh {
        // shared corners, outward winding
        let vertices = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        TriangleMesh { vertices, faces }
    }

    #[test]
    fn test_outward_box_unchanged() {
        let mut mesh = unit_box();
        assert!((mesh.signed_volume() - 1.0).abs() < 1e-12);
        let report = mesh.fix_normals().unwrap();
        assert_eq!(report.components, 1);
        assert_eq!(report.closed_components, 1);
        assert_eq!(report.flipped_triangles, 0);
        assert_eq!(mesh, unit_box());
    }

    #[test]
    fn test_inverted_box_is_flipped() {
        let mut mesh = unit_box();
        for f in &mut mesh.faces {
            f.swap(1, 2);
        }
        let report = mesh.fix_normals().unwrap();
        assert_eq!(report.flipped_triangles, 12);
        assert!((mesh.signed_volume() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_flipped_triangle_repaired() {
        let mut mesh = unit_box();
        mesh.faces[3].swap(1, 2);
        mesh.fix_normals().unwrap();
        assert!((mesh.signed_volume() - 1.0).abs() < 1e-12);
        assert_eq!(mesh.faces[3], [4, 6, 7]);
    }

    #[test]
    fn test_unwelded_faces_are_matched_by_position() {
        let shared = unit_box();
        let mut mesh = TriangleMesh::new();
        for f in &shared.faces {
            let base = mesh.vertices.len() as u32;
            for &i in f {
                mesh.vertices.push(shared.vertices[i as usize]);
            }
            mesh.faces.push([base, base + 1, base + 2]);
        }
        mesh.faces[0].swap(1, 2);

        let report = mesh.fix_normals().unwrap();
        assert_eq!(report.closed_components, 1);
        assert!((mesh.signed_volume() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_manifold_edge_leaves_mesh_untouched() {
        let mut mesh = TriangleMesh {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, -1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            faces: vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]],
        };
        let before = mesh.clone();
        assert!(matches!(mesh.fix_normals(), Err(NormalsError::NonManifold(0, 1))));
        assert_eq!(mesh, before);
    }

    #[test]
    fn test_open_strip_made_consistent() {
        let mut mesh = TriangleMesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            faces: vec![[0, 1, 2], [0, 3, 2]],
        };
        let report = mesh.fix_normals().unwrap();
        assert_eq!(report.closed_components, 0);
        assert_eq!(report.flipped_triangles, 1);
        let normals = mesh.vertex_normals();
        for n in normals {
            assert!((n[2] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_vertex_normals_unit_length() {
        let mesh = unit_box();
        let normals = mesh.vertex_normals();
        assert_eq!(normals.len(), 8);
        for n in normals {
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            assert!((len - 1.0).abs() < 1e-5);
        }
        // corner 0 averages -X, -Y, -Z faces
        let n0 = mesh.vertex_normals()[0];
        assert!(n0.iter().all(|&c| c < 0.0));
    }
}
