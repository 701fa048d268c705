#![warn(missing_docs)]

//! Math types for the stepglb converter.
//!
//! Thin wrappers around nalgebra providing the two transform flavours the
//! pipeline moves between: kernel-native [`Placement`]s (linear part plus
//! translation, kernel length units) and output-space [`Transform`]s (4x4
//! homogeneous matrices, translation already rescaled to output units).

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// Scale factor from millimeters (the usual STEP length unit) to meters.
pub const MILLIMETERS_TO_METERS: f64 = 0.001;

/// Tolerance used when checking that a rotation block has determinant +1.
pub const DETERMINANT_TOLERANCE: f64 = 1e-6;

/// A kernel-native placement: 3x3 linear part and a translation, both in
/// kernel units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Rotation (possibly with scale or reflection, if the kernel allows it).
    pub linear: Matrix3<f64>,
    /// Translation in kernel length units.
    pub translation: Vec3,
}

impl Placement {
    /// The identity placement.
    pub fn identity() -> Self {
        Self {
            linear: Matrix3::identity(),
            translation: Vec3::zeros(),
        }
    }

    /// Pure translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            linear: Matrix3::identity(),
            translation: Vec3::new(dx, dy, dz),
        }
    }

    /// Rotation about the Z axis by `angle` radians, followed by a translation.
    pub fn rotation_z(angle: f64, translation: Vec3) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            linear: Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0),
            translation,
        }
    }

    /// Build a right-handed frame from an origin, a main axis (local Z) and a
    /// reference direction (local X), the way STEP axis placements are defined.
    ///
    /// Missing axes default to global Z and X. The reference direction is
    /// projected onto the plane normal to the axis; when it is parallel to the
    /// axis an arbitrary perpendicular is used.
    pub fn from_axes(location: Point3, axis: Option<Vec3>, ref_direction: Option<Vec3>) -> Self {
        let z = axis
            .and_then(|a| a.try_normalize(1e-12))
            .unwrap_or_else(Vec3::z);
        let r = ref_direction.unwrap_or_else(Vec3::x);
        let x = (r - z * r.dot(&z))
            .try_normalize(1e-12)
            .unwrap_or_else(|| {
                let fallback = if z.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
                (fallback - z * fallback.dot(&z)).normalize()
            });
        let y = z.cross(&x);
        Self {
            linear: Matrix3::from_columns(&[x, y, z]),
            translation: location.coords,
        }
    }

    /// Compose: `self` then `other` (`self * other`, so `other` applies first).
    pub fn then(&self, other: &Placement) -> Self {
        Self {
            linear: self.linear * other.linear,
            translation: self.linear * other.translation + self.translation,
        }
    }

    /// Inverse of this placement, if the linear part is invertible.
    pub fn inverse(&self) -> Option<Self> {
        let inv = self.linear.try_inverse()?;
        Some(Self {
            linear: inv,
            translation: -(inv * self.translation),
        })
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        Point3::from(self.linear * p.coords + self.translation)
    }

    /// Whether this is exactly the identity placement.
    pub fn is_identity(&self) -> bool {
        self.linear == Matrix3::identity() && self.translation == Vec3::zeros()
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::identity()
    }
}

/// A 4x4 affine transformation matrix in output space (row-major indexing,
/// translation in the last column).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = dx;
        m[(1, 3)] = dy;
        m[(2, 3)] = dz;
        Self { matrix: m }
    }

    /// Convert a kernel placement into an output-space matrix.
    ///
    /// The linear part is copied verbatim into the upper-left 3x3 block; each
    /// translation component is multiplied by `unit_scale`. The bottom row is
    /// always `(0, 0, 0, 1)`.
    pub fn from_placement(placement: &Placement, unit_scale: f64) -> Self {
        let mut m = Matrix4::identity();
        for row in 0..3 {
            for col in 0..3 {
                m[(row, col)] = placement.linear[(row, col)];
            }
            m[(row, 3)] = placement.translation[row] * unit_scale;
        }
        Self { matrix: m }
    }

    /// Compose: `self` then `other` (self * other).
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let v = self.matrix * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// The translation column.
    pub fn translation_part(&self) -> Vec3 {
        Vec3::new(
            self.matrix[(0, 3)],
            self.matrix[(1, 3)],
            self.matrix[(2, 3)],
        )
    }

    /// Determinant of the upper-left 3x3 block.
    pub fn rotation_determinant(&self) -> f64 {
        self.matrix.fixed_view::<3, 3>(0, 0).clone_owned().determinant()
    }

    /// Whether the 3x3 block is a proper rotation (det ≈ +1).
    pub fn is_proper_rotation(&self) -> bool {
        (self.rotation_determinant() - 1.0).abs() <= DETERMINANT_TOLERANCE
    }

    /// Column-major `f32` array as stored in a glTF node `matrix`.
    pub fn to_gltf_matrix(&self) -> [f32; 16] {
        let mut out = [0.0f32; 16];
        for (dst, src) in out.iter_mut().zip(self.matrix.iter()) {
            *dst = *src as f32;
        }
        out
    }

    /// Whether this is exactly the identity transform.
    pub fn is_identity(&self) -> bool {
        self.matrix == Matrix4::identity()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}
