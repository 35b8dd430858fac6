//! Rigid body transform as a quaternion-vector pair.

use std::fmt;
use std::ops::{Mul, MulAssign};

use nalgebra::{Isometry3, Matrix4, Translation3, Vector3};

use crate::quaternion::Quaternion;

/// Rotation followed by translation. Composition `a * b` applies `b` first and then `a`,
/// so chaining poses base-to-tool reads left to right.
/// ```
/// use nalgebra::Vector3;
/// use rs_goniometer::pose::Pose;
/// use rs_goniometer::quaternion::Quaternion;
///
/// let turn = Pose::new(Quaternion::from_axis_angle(&Vector3::z(), std::f64::consts::FRAC_PI_2),
///     Vector3::zeros());
/// let shift = Pose::from_translation(Vector3::new(1.0, 0.0, 0.0));
/// let pose = turn * shift;
/// assert!((pose.translation - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Quaternion,
    pub translation: Vector3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Pose::identity()
    }
}

impl Pose {
    pub fn new(rotation: Quaternion, translation: Vector3<f64>) -> Self {
        Pose { rotation, translation }
    }

    pub fn identity() -> Self {
        Pose::new(Quaternion::identity(), Vector3::zeros())
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Pose::new(Quaternion::identity(), translation)
    }

    /// Composition `a ∘ b = (qa * qb, qa.rotate(vb) + va)`. Same as `a * b`.
    pub fn compose(a: &Pose, b: &Pose) -> Pose {
        Pose::new(
            a.rotation * b.rotation,
            a.rotation.rotate(&b.translation) + a.translation,
        )
    }

    /// Inverse transform, so that `p * p.inverse()` is identity.
    pub fn inverse(&self) -> Pose {
        let rotation = self.rotation.inverse();
        Pose::new(rotation, -rotation.rotate(&self.translation))
    }

    /// Applies the transform to a point.
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.rotate(point) + self.translation
    }

    /// Applies only the rotation (for directions).
    pub fn transform_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.rotate(vector)
    }

    /// 4x4 homogeneous transformation matrix
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation.to_matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// Reads the pose back from a 4x4 homogeneous matrix. Only the rotation block and
    /// the translation column are used.
    pub fn from_matrix(m: &Matrix4<f64>) -> Pose {
        let rotation = Quaternion::from_matrix(&m.fixed_view::<3, 3>(0, 0).into_owned());
        let translation = m.fixed_view::<3, 1>(0, 3).into_owned();
        Pose::new(rotation, translation)
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            self.rotation.to_unit_quaternion(),
        )
    }

    /// Distance between translations and the angle between rotations.
    pub fn distance_to(&self, other: &Pose) -> (f64, f64) {
        let translation = (self.translation - other.translation).norm();
        let angle = self
            .rotation
            .to_unit_quaternion()
            .angle_to(&other.rotation.to_unit_quaternion());
        (translation, angle)
    }
}

impl From<Isometry3<f64>> for Pose {
    fn from(isometry: Isometry3<f64>) -> Self {
        Pose::new(Quaternion::from(isometry.rotation), isometry.translation.vector)
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, other: Pose) -> Pose {
        Pose::compose(&self, &other)
    }
}

impl MulAssign for Pose {
    fn mul_assign(&mut self, other: Pose) {
        *self = Pose::compose(self, &other);
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Quaternion: {}, Vector: [{} {} {}]",
            self.rotation, self.translation.x, self.translation.y, self.translation.z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const SMALL: f64 = 1e-9;

    fn sample_poses() -> [Pose; 3] {
        [
            Pose::new(
                Quaternion::from_axis_angle(&Vector3::new(0.0, 0.0, 1.0), PI / 3.0),
                Vector3::new(1.0, 2.0, 3.0),
            ),
            Pose::new(
                Quaternion::from_axis_angle(&Vector3::new(1.0, 0.0, 0.0), -PI / 4.0),
                Vector3::new(-0.5, 0.0, 10.0),
            ),
            Pose::new(
                Quaternion::from_axis_angle(&Vector3::new(1.0, 1.0, 1.0), 2.0),
                Vector3::new(0.0, -7.0, 0.25),
            ),
        ]
    }

    fn assert_pose_close(a: &Pose, b: &Pose) {
        assert!((a.to_matrix() - b.to_matrix()).norm() < 1e-6, "Poses differ:\n{}\n{}", a, b);
    }

    #[test]
    fn test_compose_matches_matrix_product() {
        let [a, b, _] = sample_poses();
        let composed = (a * b).to_matrix();
        let product = a.to_matrix() * b.to_matrix();
        assert!((composed - product).norm() < 1e-6);
    }

    #[test]
    fn test_compose_is_associative_not_commutative() {
        let [a, b, c] = sample_poses();
        assert_pose_close(&((a * b) * c), &(a * (b * c)));

        let ab = a * b;
        let ba = b * a;
        assert!((ab.translation - ba.translation).norm() > 1e-3);
    }

    #[test]
    fn test_inverse() {
        for p in sample_poses().iter() {
            assert_pose_close(&(*p * p.inverse()), &Pose::identity());
            assert_pose_close(&(p.inverse() * *p), &Pose::identity());
        }
    }

    #[test]
    fn test_matrix_round_trip() {
        for p in sample_poses().iter() {
            assert_pose_close(p, &Pose::from_matrix(&p.to_matrix()));
        }
    }

    #[test]
    fn test_isometry_round_trip() {
        for p in sample_poses().iter() {
            let iso = p.to_isometry();
            assert!((iso.to_homogeneous() - p.to_matrix()).norm() < 1e-6);
            assert_pose_close(p, &Pose::from(iso));
        }
    }

    #[test]
    fn test_identity_and_mul_assign() {
        let [a, _, _] = sample_poses();
        let mut p = Pose::identity();
        p *= a;
        assert_eq!(p.translation, a.translation);
        let (dt, da) = p.distance_to(&a);
        assert!(dt < SMALL);
        assert!(da < 1e-6);
    }

    #[test]
    fn test_transform_point() {
        let p = Pose::new(
            Quaternion::from_axis_angle(&Vector3::z(), PI / 2.0),
            Vector3::new(0.0, 0.0, 1.0),
        );
        let moved = p.transform_point(&Vector3::new(1.0, 0.0, 0.0));
        assert!((moved - Vector3::new(0.0, 1.0, 1.0)).norm() < SMALL);
        let turned = p.transform_vector(&Vector3::new(1.0, 0.0, 0.0));
        assert!((turned - Vector3::new(0.0, 1.0, 0.0)).norm() < SMALL);
    }
}
