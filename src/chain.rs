//! Open kinematic chain (serial manipulator) of the positioner.
//!
//! The chain holds the joints in kinematic order together with the base pose (where the
//! positioner is mounted) and the tool pose (offset from the last joint to the end
//! effector, the sample holder). Both are fixed transforms, the same way the base and
//! tool are treated for the robot arms:
//!
//! ```text
//! pose = base * joint[0] * joint[1] * ... * joint[n-1] * tool
//! ```
//!
//! Forward kinematics comes in two flavours. [`KinematicChain::compute_forward_kinematics`]
//! only computes the pose for a hypothetical configuration. [`KinematicChain::move_to`]
//! moves the joints to the configuration and returns the resulting pose.

use nalgebra::Vector3;

use crate::joint::Joint;
use crate::kinematics_error::{check_length, KinematicsError};
use crate::pose::Pose;

/// Controls which part of the chain is evaluated and how the joints are moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FkOptions {
    /// Index of the first joint to include.
    pub start: usize,
    /// One past the last joint to include. `None` means up to the end of the chain.
    pub end: Option<usize>,
    /// Include the base pose (only applies if the span starts at joint 0).
    pub include_base: bool,
    /// Move locked joints as well.
    pub ignore_locks: bool,
    /// Given configuration is a set point (and not an intermediate animation step).
    pub set_point: bool,
}

impl Default for FkOptions {
    fn default() -> Self {
        Self {
            start: 0,
            end: None,
            include_base: true,
            ignore_locks: false,
            set_point: true,
        }
    }
}

impl FkOptions {
    /// Options for an intermediate step of animated motion: the set points are kept.
    pub fn intermediate() -> Self {
        Self { set_point: false, ..Self::default() }
    }

    /// Options to evaluate only the joints in `[start, end)`.
    pub fn span(start: usize, end: usize) -> Self {
        Self { start, end: Some(end), ..Self::default() }
    }
}

#[derive(Debug, Clone)]
pub struct KinematicChain {
    pub name: String,
    joints: Vec<Joint>,

    /// Transformation from the instrument origin to the base of the chain.
    base: Pose,
    default_base: Pose,

    /// Transformation from the last joint to the end effector.
    tool: Pose,

    /// Key of the mesh drawn for the base. Never dereferenced by the kinematics.
    pub base_mesh: Option<String>,
}

impl KinematicChain {
    /// Creates the chain. `None` for base or tool means identity.
    pub fn new(joints: Vec<Joint>, base: Option<Pose>, tool: Option<Pose>) -> Self {
        let base = base.unwrap_or_else(Pose::identity);
        KinematicChain {
            name: String::new(),
            joints,
            base,
            default_base: base,
            tool: tool.unwrap_or_else(Pose::identity),
            base_mesh: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_base_mesh(mut self, mesh: &str) -> Self {
        self.base_mesh = Some(mesh.to_string());
        self
    }

    pub fn number_of_joints(&self) -> usize {
        self.joints.len()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    pub fn joint_mut(&mut self, index: usize) -> Option<&mut Joint> {
        self.joints.get_mut(index)
    }

    pub fn base(&self) -> &Pose {
        &self.base
    }

    /// Moves the base. The default base given at construction is kept and can be
    /// restored with [`KinematicChain::reset`].
    pub fn set_base(&mut self, base: Pose) {
        self.base = base;
    }

    pub fn default_base(&self) -> &Pose {
        &self.default_base
    }

    pub fn tool(&self) -> &Pose {
        &self.tool
    }

    pub fn set_tool(&mut self, tool: Pose) {
        self.tool = tool;
    }

    /// Resolves the options into the actual span and the base and tool that apply to it.
    fn span(&self, options: &FkOptions) -> (usize, usize, Pose, Pose) {
        let count = self.joints.len();
        let end = options.end.map_or(count, |end| end.min(count));
        let start = options.start.min(end);

        // Decided on the requested start, a span clamped down to 0 does not gain the base
        let base = if options.include_base && options.start == 0 {
            self.base
        } else {
            Pose::identity()
        };
        let tool = if end == count { self.tool } else { Pose::identity() };
        (start, end, base, tool)
    }

    /// Computes the pose the chain would have at the configuration `q`, without moving
    /// any joint. Locked joints contribute their current pose unless locks are ignored.
    pub fn compute_forward_kinematics(&self, q: &[f64], options: &FkOptions) -> Result<Pose, KinematicsError> {
        check_length(self.joints.len(), q.len())?;
        let (start, end, base, tool) = self.span(options);

        let mut qs = Pose::identity();
        for (joint, &offset) in self.joints[start..end].iter().zip(&q[start..end]) {
            if joint.locked() && !options.ignore_locks {
                qs *= *joint.pose();
            } else {
                qs *= joint.pose_at(offset);
            }
        }
        Ok(base * qs * tool)
    }

    /// Forward kinematics of the whole chain at `q` with default options, not moving
    /// the joints.
    pub fn forward_kinematics(&self, q: &[f64]) -> Result<Pose, KinematicsError> {
        self.compute_forward_kinematics(q, &FkOptions::default())
    }

    /// Moves the joints in the span to the configuration `q` and returns the resulting
    /// pose of the span. Joints outside the span are not moved.
    pub fn move_to(&mut self, q: &[f64], options: &FkOptions) -> Result<Pose, KinematicsError> {
        check_length(self.joints.len(), q.len())?;
        let (start, end, _, _) = self.span(options);
        for (joint, &offset) in self.joints[start..end].iter_mut().zip(&q[start..end]) {
            joint.move_to(offset, options.ignore_locks, options.set_point);
        }
        self.compute_forward_kinematics(q, options)
    }

    /// Current pose of the end effector. Nothing is moved.
    pub fn pose(&self) -> Pose {
        let qs = self.joints.iter().fold(Pose::identity(), |acc, joint| acc * *joint.pose());
        self.base * qs * self.tool
    }

    /// Cumulative pose of every joint in the instrument frame (base included, tool not).
    /// Used to place the meshes attached to the joints.
    pub fn link_poses(&self) -> Vec<Pose> {
        let mut pose = self.base;
        self.joints
            .iter()
            .map(|joint| {
                pose *= *joint.pose();
                pose
            })
            .collect()
    }

    /// Moves all joints to their default offsets.
    pub fn reset_offsets(&mut self) {
        for joint in self.joints.iter_mut() {
            joint.reset();
        }
    }

    /// Restores the default base, joint offsets, and clears locks and ignored limits.
    pub fn reset(&mut self) {
        self.base = self.default_base;
        for joint in self.joints.iter_mut() {
            joint.reset();
            joint.set_locked(false);
            joint.set_ignore_limits(false);
        }
    }

    /// Current offsets of all joints.
    pub fn configuration(&self) -> Vec<f64> {
        self.joints.iter().map(|joint| joint.offset()).collect()
    }

    /// Expected configuration (set points). Differs from [`KinematicChain::configuration`]
    /// while the chain is animated towards the set points.
    pub fn set_points(&self) -> Vec<f64> {
        self.joints.iter().map(|joint| joint.set_point).collect()
    }

    pub fn set_set_points(&mut self, q: &[f64]) -> Result<(), KinematicsError> {
        check_length(self.joints.len(), q.len())?;
        for (joint, &offset) in self.joints.iter_mut().zip(q) {
            joint.set_point = offset;
        }
        Ok(())
    }

    /// Per-joint bounds with absent limits as infinity.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.joints.iter().map(|joint| joint.bounds()).collect()
    }

    /// Position of a point given in end effector frame, in the instrument frame.
    pub fn locate(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.pose().transform_point(point)
    }
}
