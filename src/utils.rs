//! Helper functions

use crate::chain::KinematicChain;
use crate::joint::JointType;
use crate::pose::Pose;

/// Checks if all elements in the configuration are finite
pub fn is_valid(q: &[f64]) -> bool {
    q.iter().all(|&v| v.is_finite())
}

/// Print joint offsets of the chain, converting revolute joints to degrees.
#[allow(dead_code)]
pub fn dump_joints(chain: &KinematicChain, q: &[f64]) {
    let mut row_str = String::new();
    for (joint, &offset) in chain.joints().iter().zip(q) {
        let shown = match joint.joint_type() {
            JointType::Revolute => offset.to_degrees(),
            JointType::Prismatic => offset,
        };
        row_str.push_str(&format!("{:5.2} ", shown));
    }
    println!("[{}]", row_str.trim_end());
}

/// Print the pose as translation and rotation axis with the angle in degrees.
#[allow(dead_code)]
pub fn dump_pose(pose: &Pose) {
    let t = pose.translation;
    let (axis, angle) = pose.rotation.to_axis_angle();
    println!(
        "[{:.3}, {:.3}, {:.3}], axis [{:.3}, {:.3}, {:.3}] angle {:.2}°",
        t.x, t.y, t.z, axis.x, axis.y, axis.z, angle.to_degrees()
    );
}

/// Clamps the value into `[min, max]`. Unlike `f64::clamp`, does not panic if
/// `min > max`, returning `max` in that case.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Linearly maps `value` from `[from_low, from_high]` to `[to_low, to_high]`.
pub fn map_range(from_low: f64, from_high: f64, to_low: f64, to_high: f64, value: f64) -> f64 {
    to_low + (value - from_low) * (to_high - to_low) / (from_high - from_low)
}

/// Relative and absolute closeness test.
pub fn is_close(a: f64, b: f64, rel_tol: f64, abs_tol: f64) -> bool {
    (a - b).abs() <= (rel_tol * a.abs().max(b.abs())).max(abs_tol)
}
