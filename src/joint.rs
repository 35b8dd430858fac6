//! Single degree of freedom of the positioner (revolute or prismatic joint).

use bitflags::bitflags;
use nalgebra::{Matrix4, Vector3};

use crate::kinematics_error::KinematicsError;
use crate::pose::Pose;
use crate::quaternion::Quaternion;

/// Axis shorter than this is treated as zero vector.
const MIN_AXIS_LENGTH: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointType {
    /// Rotates about the axis passing through the home point. Offset in radians.
    Revolute,
    /// Slides along the axis. Offset in length units of the instrument.
    Prismatic,
}

bitflags! {
    /// Soft state of the joint. Neither flag changes the kinematics: the lock is
    /// honored by [`Joint::move_to`], limits only by the inverse kinematics search.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct JointFlags: u8 {
        /// Joint stays where it is unless the move explicitly ignores locks.
        const LOCKED =        0b0000_0001;

        /// Lower and upper limits are not taken into consideration.
        const IGNORE_LIMITS = 0b0000_0010;
    }
}

/// Joint of the kinematic chain, represented as quaternion-vector pair that is
/// recomputed every time the joint moves.
#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,

    /// Unit axis of rotation or translation
    axis: Vector3<f64>,

    /// Position of the joint centre when offset is zero
    home: Vector3<f64>,

    joint_type: JointType,

    pub default_offset: f64,
    pub lower_limit: Option<f64>,
    pub upper_limit: Option<f64>,

    /// Current offset, may be an intermediate value while animating.
    offset: f64,

    /// Commanded offset, where the joint is expected to end up.
    pub set_point: f64,

    pub flags: JointFlags,

    /// Key of the mesh drawn for this joint. Never dereferenced by the kinematics.
    pub mesh: Option<String>,

    pose: Pose,
}

impl Joint {
    /// Creates the joint at its default offset. Fails if the axis is a zero vector.
    pub fn new(
        axis: Vector3<f64>,
        home: Vector3<f64>,
        joint_type: JointType,
        default_offset: f64,
        lower_limit: Option<f64>,
        upper_limit: Option<f64>,
    ) -> Result<Self, KinematicsError> {
        if axis.norm() < MIN_AXIS_LENGTH {
            return Err(KinematicsError::ZeroAxis);
        }
        let axis = axis.normalize();

        let mut joint = Joint {
            name: String::new(),
            axis,
            home,
            joint_type,
            default_offset,
            lower_limit,
            upper_limit,
            offset: default_offset,
            set_point: default_offset,
            flags: JointFlags::empty(),
            mesh: None,
            pose: Pose::new(Quaternion::from_axis_angle(&axis, 0.0), home),
        };
        joint.reset();
        Ok(joint)
    }

    pub fn revolute(axis: Vector3<f64>, home: Vector3<f64>) -> Result<Self, KinematicsError> {
        Joint::new(axis, home, JointType::Revolute, 0.0, None, None)
    }

    pub fn prismatic(axis: Vector3<f64>, home: Vector3<f64>) -> Result<Self, KinematicsError> {
        Joint::new(axis, home, JointType::Prismatic, 0.0, None, None)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.lower_limit = Some(lower);
        self.upper_limit = Some(upper);
        self
    }

    pub fn with_mesh(mut self, mesh: &str) -> Self {
        self.mesh = Some(mesh.to_string());
        self
    }

    pub fn axis(&self) -> &Vector3<f64> {
        &self.axis
    }

    pub fn home(&self) -> &Vector3<f64> {
        &self.home
    }

    pub fn joint_type(&self) -> JointType {
        self.joint_type
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn locked(&self) -> bool {
        self.flags.contains(JointFlags::LOCKED)
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.flags.set(JointFlags::LOCKED, locked);
    }

    pub fn ignore_limits(&self) -> bool {
        self.flags.contains(JointFlags::IGNORE_LIMITS)
    }

    pub fn set_ignore_limits(&mut self, ignore: bool) {
        self.flags.set(JointFlags::IGNORE_LIMITS, ignore);
    }

    /// Moves the joint to the given offset. A locked joint silently stays in place
    /// unless `ignore_locks` is set. The set point is only updated if `set_point`
    /// is true, so an animation can pass through intermediate offsets while the
    /// commanded value is kept.
    pub fn move_to(&mut self, offset: f64, ignore_locks: bool, set_point: bool) {
        if self.locked() && !ignore_locks {
            return;
        }

        self.offset = offset;
        if set_point {
            self.set_point = offset;
        }
        self.pose = self.pose_at(offset);
    }

    /// Moves the joint back to the default offset, ignoring the lock.
    pub fn reset(&mut self) {
        self.move_to(self.default_offset, true, true);
    }

    /// Local pose of the joint at the current offset
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Local pose the joint would have at the given offset. Does not move the joint.
    pub fn pose_at(&self, offset: f64) -> Pose {
        match self.joint_type {
            JointType::Revolute => {
                let rotation = Quaternion::from_axis_angle(&self.axis, offset);
                Pose::new(rotation, rotation.rotate(&self.home))
            }
            JointType::Prismatic => {
                Pose::new(self.pose.rotation, self.home + self.axis * offset)
            }
        }
    }

    pub fn transformation_matrix(&self) -> Matrix4<f64> {
        self.pose.to_matrix()
    }

    /// Lower and upper limit, with absent limits mapped to infinity.
    pub fn bounds(&self) -> (f64, f64) {
        (
            self.lower_limit.unwrap_or(f64::NEG_INFINITY),
            self.upper_limit.unwrap_or(f64::INFINITY),
        )
    }

    /// Checks the offset against limits. Always true if limits are ignored.
    pub fn within_limits(&self, offset: f64) -> bool {
        if self.ignore_limits() {
            return true;
        }
        let (lower, upper) = self.bounds();
        offset >= lower && offset <= upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const SMALL: f64 = 1e-5;

    fn assert_xyz(actual: &Vector3<f64>, expected: [f64; 3]) {
        let expected = Vector3::new(expected[0], expected[1], expected[2]);
        assert!(
            (actual - expected).norm() < SMALL,
            "Expected {:?}, got {:?}", expected, actual
        );
    }

    #[test]
    fn test_zero_axis_rejected() {
        let result = Joint::revolute(Vector3::zeros(), Vector3::zeros());
        assert!(matches!(result, Err(KinematicsError::ZeroAxis)));

        let result = Joint::prismatic(Vector3::new(0.0, 1e-7, 0.0), Vector3::zeros());
        assert!(matches!(result, Err(KinematicsError::ZeroAxis)));
    }

    #[test]
    fn test_revolute_pose() {
        let mut joint = Joint::revolute(Vector3::new(0.0, 0.0, 1.0), Vector3::new(1.0, 0.0, 0.0))
            .expect("valid axis");
        assert_xyz(&joint.pose().translation, [1.0, 0.0, 0.0]);

        joint.move_to(PI / 2.0, false, true);
        assert_xyz(&joint.pose().translation, [0.0, 1.0, 0.0]);
        assert_eq!(joint.offset(), PI / 2.0);
        assert_eq!(joint.set_point, PI / 2.0);
    }

    #[test]
    fn test_prismatic_pose() {
        let mut joint = Joint::prismatic(Vector3::new(0.0, 1.0, 0.0), Vector3::zeros())
            .expect("valid axis");
        joint.move_to(5.0, false, true);
        assert_xyz(&joint.pose().translation, [0.0, 5.0, 0.0]);
        assert_eq!(joint.pose().rotation, Quaternion::identity());
    }

    #[test]
    fn test_axis_is_normalized() {
        let mut joint = Joint::prismatic(Vector3::new(0.0, 0.0, 4.0), Vector3::new(1.0, 1.0, 0.0))
            .expect("valid axis");
        joint.move_to(2.0, false, true);
        assert_xyz(&joint.pose().translation, [1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_locked_move_is_ignored() {
        let mut joint = Joint::new(
            Vector3::z(), Vector3::x(), JointType::Revolute, 0.5, None, None,
        ).expect("valid axis");
        joint.set_locked(true);
        let before = *joint.pose();

        joint.move_to(1.0, false, true);
        assert_eq!(joint.offset(), 0.5);
        assert_eq!(joint.set_point, 0.5);
        assert_eq!(*joint.pose(), before);

        joint.move_to(1.0, true, false);
        assert_eq!(joint.offset(), 1.0);
        assert_eq!(joint.set_point, 0.5);

        joint.move_to(1.5, true, true);
        assert_eq!(joint.offset(), 1.5);
        assert_eq!(joint.set_point, 1.5);
    }

    #[test]
    fn test_set_point_kept_for_intermediate_moves() {
        let mut joint = Joint::revolute(Vector3::z(), Vector3::x()).expect("valid axis");
        joint.move_to(1.0, false, true);
        joint.move_to(0.3, false, false);
        assert_eq!(joint.offset(), 0.3);
        assert_eq!(joint.set_point, 1.0);
    }

    #[test]
    fn test_reset_ignores_lock() {
        let mut joint = Joint::new(
            Vector3::y(), Vector3::zeros(), JointType::Prismatic, 3.0, Some(-10.0), Some(10.0),
        ).expect("valid axis");
        joint.move_to(7.0, false, true);
        joint.set_locked(true);
        joint.reset();
        assert_eq!(joint.offset(), 3.0);
        assert_eq!(joint.set_point, 3.0);
        assert_xyz(&joint.pose().translation, [0.0, 3.0, 0.0]);
        assert!(joint.locked());
    }

    #[test]
    fn test_pose_at_does_not_move() {
        let joint = Joint::revolute(Vector3::z(), Vector3::x()).expect("valid axis");
        let pose = joint.pose_at(PI);
        assert_xyz(&pose.translation, [-1.0, 0.0, 0.0]);
        assert_eq!(joint.offset(), 0.0);
        assert_xyz(&joint.pose().translation, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_limits_are_advisory() {
        let mut joint = Joint::revolute(Vector3::z(), Vector3::x())
            .expect("valid axis")
            .with_limits(-1.0, 1.0);
        joint.move_to(2.0, false, true);
        assert_eq!(joint.offset(), 2.0);
        assert!(!joint.within_limits(2.0));
        joint.set_ignore_limits(true);
        assert!(joint.within_limits(2.0));

        let free = Joint::revolute(Vector3::z(), Vector3::x()).expect("valid axis");
        assert_eq!(free.bounds(), (f64::NEG_INFINITY, f64::INFINITY));
        assert!(free.within_limits(1e9));
    }

    #[test]
    fn test_transformation_matrix() {
        let mut joint = Joint::prismatic(Vector3::x(), Vector3::new(0.0, 0.0, 1.0))
            .expect("valid axis")
            .with_name("x stage")
            .with_mesh("x_stage.stl");
        joint.move_to(2.0, false, true);
        let m = joint.transformation_matrix();
        assert_eq!(m[(0, 3)], 2.0);
        assert_eq!(m[(2, 3)], 1.0);
        assert_eq!(m[(3, 3)], 1.0);
        assert_eq!(joint.name, "x stage");
        assert_eq!(joint.mesh.as_deref(), Some("x_stage.stl"));
    }
}
