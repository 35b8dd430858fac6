//! Rotation quaternion used by the positioner model.
//!
//! The kinematic chain stores every joint as a quaternion-vector pair, so the rotation
//! arithmetic is kept explicit here rather than delegated to `UnitQuaternion`. Vectors
//! and matrices are still the nalgebra ones, so the results plug directly into code that
//! works with nalgebra types.

use std::fmt;
use std::ops::Mul;

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::utils::is_close;

/// Angle (radians) below which the rotation axis is undefined. Also used as the
/// threshold when selecting the branch in [`Quaternion::from_matrix`].
pub const EPSILON: f64 = 1e-7;

/// Quaternion with scalar part `w` and vector part `(x, y, z)`. Unit quaternions
/// represent rotations. The type is `Copy` and all operations return new values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::identity()
    }
}

impl Quaternion {
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Quaternion { w, x, y, z }
    }

    /// Quaternion representing no rotation
    pub fn identity() -> Self {
        Quaternion::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Pure quaternion (zero scalar part) embedding a vector.
    pub fn pure(v: &Vector3<f64>) -> Self {
        Quaternion::new(0.0, v.x, v.y, v.z)
    }

    /// Vector part of the quaternion.
    pub fn axis(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn conjugate(&self) -> Self {
        Quaternion::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn magnitude(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn dot(&self, other: &Quaternion) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Returns the quaternion scaled to unit length. The zero quaternion has no
    /// direction and is returned as is.
    pub fn normalize(&self) -> Self {
        let length = self.magnitude();
        if length != 0.0 {
            Quaternion::new(self.w / length, self.x / length, self.y / length, self.z / length)
        } else {
            Quaternion::new(0.0, 0.0, 0.0, 0.0)
        }
    }

    /// Inverse of a rotation (normalized conjugate).
    pub fn inverse(&self) -> Self {
        self.conjugate().normalize()
    }

    /// Rotates the point by sandwiching it between this quaternion and its inverse:
    /// `q * p * q⁻¹`. For unit quaternions this matches multiplying by [`to_matrix`].
    ///
    /// [`to_matrix`]: Quaternion::to_matrix
    pub fn rotate(&self, point: &Vector3<f64>) -> Vector3<f64> {
        let p = Quaternion::pure(point);
        let rotated = *self * p * self.inverse();
        rotated.axis()
    }

    /// Creates the rotation of `angle` radians about `axis`. The axis is normalized
    /// first and must not be zero.
    pub fn from_axis_angle(axis: &Vector3<f64>, angle: f64) -> Self {
        let half = angle / 2.0;
        let v = axis.normalize() * half.sin();
        Quaternion::new(half.cos(), v.x, v.y, v.z)
    }

    /// Returns the rotation as (axis, angle). If the angle is below [`EPSILON`],
    /// the axis is returned as zero vector.
    pub fn to_axis_angle(&self) -> (Vector3<f64>, f64) {
        let w = self.w.clamp(-1.0, 1.0);
        let angle = 2.0 * w.acos();
        if angle < EPSILON {
            return (Vector3::zeros(), angle);
        }
        let s = (1.0 - w * w).sqrt();
        (self.axis() / s, angle)
    }

    /// 3x3 rotation matrix of this (unit) quaternion
    pub fn to_matrix(&self) -> Matrix3<f64> {
        let (w, x, y, z) = (self.w, self.x, self.y, self.z);

        let two_xx = 2.0 * x * x;
        let two_yy = 2.0 * y * y;
        let two_zz = 2.0 * z * z;

        let two_wx = 2.0 * w * x;
        let two_wy = 2.0 * w * y;
        let two_wz = 2.0 * w * z;

        let two_xy = 2.0 * x * y;
        let two_xz = 2.0 * x * z;
        let two_yz = 2.0 * y * z;

        Matrix3::new(
            1.0 - two_yy - two_zz, two_xy - two_wz, two_xz + two_wy,
            two_xy + two_wz, 1.0 - two_xx - two_zz, two_yz - two_wx,
            two_xz - two_wy, two_yz + two_wx, 1.0 - two_xx - two_yy,
        )
    }

    /// Extracts the quaternion from a rotation matrix. One of four formulas is selected
    /// so that the square root is always taken of the largest of `1 + trace` and
    /// `1 + 2 m_ii - trace`, keeping the division away from zero.
    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        let (m11, m12, m13) = (m[(0, 0)], m[(0, 1)], m[(0, 2)]);
        let (m21, m22, m23) = (m[(1, 0)], m[(1, 1)], m[(1, 2)]);
        let (m31, m32, m33) = (m[(2, 0)], m[(2, 1)], m[(2, 2)]);

        // Components are gathered in (w, x, y, z) order.
        let (t, q) = if m33 < EPSILON {
            if m11 > m22 {
                let t = 1.0 + m11 - m22 - m33;
                (t, [m32 - m23, t, m12 + m21, m13 + m31])
            } else {
                let t = 1.0 - m11 + m22 - m33;
                (t, [m13 - m31, m12 + m21, t, m23 + m32])
            }
        } else if m11 < -m22 {
            let t = 1.0 - m11 - m22 + m33;
            (t, [m21 - m12, m13 + m31, m23 + m32, t])
        } else {
            let t = 1.0 + m11 + m22 + m33;
            (t, [t, m32 - m23, m13 - m31, m21 - m12])
        };

        let scale = 0.5 / t.sqrt();
        Quaternion::new(q[0] * scale, q[1] * scale, q[2] * scale, q[3] * scale)
    }

    /// Converts into nalgebra unit quaternion (normalizing if needed)
    pub fn to_unit_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(self.w, self.x, self.y, self.z))
    }

    /// True if both quaternions represent the same rotation within tolerance
    /// (q and -q are the same rotation).
    pub fn same_rotation(&self, other: &Quaternion, tolerance: f64) -> bool {
        is_close(self.dot(other).abs(), 1.0, 0.0, tolerance)
    }
}

impl From<UnitQuaternion<f64>> for Quaternion {
    fn from(q: UnitQuaternion<f64>) -> Self {
        Quaternion::new(q.w, q.i, q.j, q.k)
    }
}

/// Hamilton product.
impl Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, other: Quaternion) -> Quaternion {
        let v1 = self.axis();
        let v2 = other.axis();

        let w = self.w * other.w - v1.dot(&v2);
        let v = v2 * self.w + v1 * other.w + v1.cross(&v2);

        Quaternion::new(w, v.x, v.y, v.z)
    }
}

impl fmt::Display for Quaternion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} <{} {} {}>]", self.w, self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    const SMALL: f64 = 1e-5;

    fn assert_quaternion_eq(a: &Quaternion, b: &Quaternion) {
        assert!(
            a.same_rotation(b, SMALL),
            "Quaternions differ: {} vs {}", a, b
        );
    }

    fn random_rotation(rng: &mut StdRng) -> Quaternion {
        let axis = Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0) + 2.0, // Never zero
        );
        Quaternion::from_axis_angle(&axis, rng.gen_range(-PI..PI))
    }

    #[test]
    fn test_hamilton_product_basis() {
        let i = Quaternion::new(0.0, 1.0, 0.0, 0.0);
        let j = Quaternion::new(0.0, 0.0, 1.0, 0.0);
        let k = Quaternion::new(0.0, 0.0, 0.0, 1.0);

        assert_eq!(i * j, k);
        assert_eq!(j * i, Quaternion::new(0.0, 0.0, 0.0, -1.0));
        assert_eq!(i * i, Quaternion::new(-1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_compose_with_inverse_is_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let q = random_rotation(&mut rng);
            assert!((q.magnitude() - 1.0).abs() < SMALL);
            let r = q * q.inverse();
            assert!((r.w - 1.0).abs() < SMALL, "Not identity: {}", r);
            assert!(r.axis().norm() < SMALL, "Not identity: {}", r);
        }
    }

    #[test]
    fn test_rotate_matches_matrix() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let q = random_rotation(&mut rng);
            let v = Vector3::new(
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
            );
            let by_sandwich = q.rotate(&v);
            let by_matrix = q.to_matrix() * v;
            assert!((by_sandwich - by_matrix).norm() < SMALL);
        }
    }

    #[test]
    fn test_rotate_about_z() {
        let q = Quaternion::from_axis_angle(&Vector3::new(0.0, 0.0, 2.0), PI / 2.0);
        let rotated = q.rotate(&Vector3::new(1.0, 0.0, 0.0));
        assert!((rotated - Vector3::new(0.0, 1.0, 0.0)).norm() < SMALL);
    }

    #[test]
    fn test_from_matrix_all_branches() {
        // Small rotation: trace branch. Rotations by PI about x, y, z hit the other three.
        let cases = [
            Quaternion::from_axis_angle(&Vector3::new(1.0, 1.0, 0.0), 0.3),
            Quaternion::from_axis_angle(&Vector3::x(), PI),
            Quaternion::from_axis_angle(&Vector3::y(), PI),
            Quaternion::from_axis_angle(&Vector3::z(), PI),
            Quaternion::from_axis_angle(&Vector3::new(1.0, -2.0, 0.5), 2.9),
        ];
        for q in cases.iter() {
            let back = Quaternion::from_matrix(&q.to_matrix());
            assert_quaternion_eq(q, &back);
            assert!((back.magnitude() - 1.0).abs() < SMALL);
        }
    }

    #[test]
    fn test_from_matrix_random() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let q = random_rotation(&mut rng);
            assert_quaternion_eq(&q, &Quaternion::from_matrix(&q.to_matrix()));
        }
    }

    #[test]
    fn test_axis_angle_round_trip() {
        let axis = Vector3::new(0.0, 3.0, 4.0);
        let q = Quaternion::from_axis_angle(&axis, 1.2);
        let (back_axis, back_angle) = q.to_axis_angle();
        assert!((back_angle - 1.2).abs() < SMALL);
        assert!((back_axis - axis.normalize()).norm() < SMALL);

        let (zero_axis, zero_angle) = Quaternion::identity().to_axis_angle();
        assert_eq!(zero_axis, Vector3::zeros());
        assert!(zero_angle.abs() < EPSILON);
    }

    #[test]
    fn test_normalize_zero() {
        let zero = Quaternion::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(zero.normalize(), zero);
        let n = Quaternion::new(2.0, 0.0, 0.0, 0.0).normalize();
        assert_eq!(n, Quaternion::identity());
    }

    #[test]
    fn test_matches_nalgebra() {
        let axis = Vector3::new(0.2, -0.4, 1.0);
        let ours = Quaternion::from_axis_angle(&axis, 0.7);
        let theirs = UnitQuaternion::from_axis_angle(&nalgebra::Unit::new_normalize(axis), 0.7);
        assert_quaternion_eq(&ours, &Quaternion::from(theirs));
        assert!((ours.to_matrix() - theirs.to_rotation_matrix().into_inner()).norm() < SMALL);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Quaternion::identity()), "[1 <0 0 0>]");
    }
}
