#![warn(missing_docs)]

//! Math types for the strata toolpath pipeline.
//!
//! Thin wrappers around nalgebra providing the point and vector types
//! used throughout slicing and toolpath assembly, an affine transform for
//! placing meshes on the build plate, and the planar helpers (distances,
//! turning angles, interpolation) the fill and support stages share.

use nalgebra::{Matrix4, Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// A point in 3D machine space (mm).
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A point in the XY plane of a layer (mm).
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in 2D space.
pub type Vec2 = Vector2<f64>;

/// Affine placement of a mesh on the build plate, stored as a homogeneous
/// matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Homogeneous 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// No-op placement.
    pub fn identity() -> Self {
        Self::from_matrix(Matrix4::identity())
    }

    /// Shift by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self::from_matrix(Matrix4::new_translation(&Vec3::new(dx, dy, dz)))
    }

    /// Per-axis scale about the origin.
    pub fn scale(sx: f64, sy: f64, sz: f64) -> Self {
        Self::from_matrix(Matrix4::new_nonuniform_scaling(&Vec3::new(sx, sy, sz)))
    }

    /// Turn about the build (Z) axis by `angle` radians, counter-clockwise
    /// seen from above.
    pub fn rotation_z(angle: f64) -> Self {
        Self::from_matrix(Rotation3::from_axis_angle(&Vec3::z_axis(), angle).to_homogeneous())
    }

    /// Matrix product `self * other`: `other` is applied first.
    pub fn then(&self, other: &Transform) -> Self {
        Self::from_matrix(self.matrix * other.matrix)
    }

    /// Map a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        self.matrix.transform_point(p)
    }

    fn from_matrix(matrix: Matrix4<f64>) -> Self {
        Self { matrix }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Tolerances used by the slicing and toolpath stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// Distance under which two planar points are the same vertex (mm).
    pub linear: f64,
    /// Z offset applied when a slicing plane produced no intersection (mm).
    pub z_jitter: f64,
}

impl Tolerance {
    /// Slicing defaults.
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        z_jitter: 1e-4,
    };

    /// Are `a` and `b` the same planar vertex?
    pub fn points_equal(&self, a: &Point2, b: &Point2) -> bool {
        nalgebra::distance(a, b) < self.linear
    }

    /// Is the length `d` negligible?
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() < self.linear
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// 2D cross product (z component of `a x b`).
pub fn cross2(a: &Vec2, b: &Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Point at parameter `t` on the segment `a`-`b` in the layer plane.
pub fn lerp2(a: &Point2, b: &Point2, t: f64) -> Point2 {
    a + (b - a) * t
}

/// Point at parameter `t` on the segment `a`-`b` in machine space.
pub fn lerp3(a: &Point3, b: &Point3, t: f64) -> Point3 {
    a + (b - a) * t
}

/// Distance from `p` to the segment `a`-`b`.
pub fn segment_distance(p: &Point2, a: &Point2, b: &Point2) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < 1e-24 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Interior opening angle (degrees) at vertex `b` of the path `a`-`b`-`c`.
///
/// A straight continuation is 180 degrees; a needle tip approaches 0.
pub fn opening_angle_deg(a: &Point2, b: &Point2, c: &Point2) -> f64 {
    let u = a - b;
    let v = c - b;
    let nu = u.norm();
    let nv = v.norm();
    if nu < 1e-12 || nv < 1e-12 {
        return 180.0;
    }
    let cos = (u.dot(&v) / (nu * nv)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}
