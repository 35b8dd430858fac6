//! Numeric inverse kinematics of the positioner.
//!
//! Positioners rarely have a closed form solution (any mix of stages is possible) so the
//! configuration is found by bounded global minimization of the pose error. The target is
//! given as a point and a direction in the base frame; the solver finds offsets of the
//! unlocked joints that carry `local.point` to `target.position` and `local.direction`
//! to `target.direction`.

use std::f64::consts::PI;
use std::sync::atomic::AtomicBool;

use nalgebra::Vector3;
use tracing::debug;

use crate::annealing::DualAnnealing;
use crate::chain::{FkOptions, KinematicChain};
use crate::joint::JointType;
use crate::kinematics_error::{check_length, KinematicsError};
use crate::parameters::solver::SolverParameters;
use crate::pose::Pose;
use crate::utils::{clamp, is_valid};

/// Where the point and direction carried by the end effector must end up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkTarget {
    pub position: Vector3<f64>,
    pub direction: Vector3<f64>,
}

/// Point and direction expressed in the end effector frame (usually a measurement point
/// on the sample and its normal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkLocal {
    pub point: Vector3<f64>,
    pub direction: Vector3<f64>,
}

impl IkLocal {
    /// The end effector origin with the direction along z.
    pub fn origin() -> Self {
        IkLocal { point: Vector3::zeros(), direction: Vector3::z() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IkSolution {
    /// Full configuration, locked joints keep their offsets.
    pub configuration: Vec<f64>,
    /// Sum of squared position and direction errors.
    pub cost: f64,
    /// Number of forward kinematics evaluations used.
    pub evaluations: usize,
    /// Cost is below the squared tolerance.
    pub converged: bool,
}

/// Sum of squared errors of the carried point and direction against the target.
pub fn pose_error(pose: &Pose, target: &IkTarget, local: &IkLocal) -> f64 {
    let position = target.position - pose.transform_point(&local.point);
    let direction = target.direction - pose.transform_vector(&local.direction);
    position.norm_squared() + direction.norm_squared()
}

#[derive(Debug, Clone, Copy)]
pub struct IkSolver {
    pub parameters: SolverParameters,
    /// Error below which the target counts as reached.
    pub tolerance: f64,
}

impl IkSolver {
    pub fn new(parameters: SolverParameters, tolerance: f64) -> Self {
        IkSolver { parameters, tolerance }
    }

    /// Finds offsets of the unlocked joints within `bounds` (one pair per joint, see
    /// [`KinematicChain::bounds`]) that bring `local` onto `target`. The chain is left
    /// at the returned configuration. Not reaching the target is reported through
    /// [`IkSolution::converged`], the best configuration found is returned anyway.
    /// Raising `stop` ends the search early with the best configuration so far.
    pub fn solve(
        &self,
        chain: &mut KinematicChain,
        target: &IkTarget,
        local: &IkLocal,
        bounds: &[(f64, f64)],
        stop: Option<&AtomicBool>,
    ) -> Result<IkSolution, KinematicsError> {
        check_length(chain.number_of_joints(), bounds.len())?;
        let options = FkOptions::default();
        let threshold = self.tolerance * self.tolerance;

        let start = chain.configuration();
        let current_cost = pose_error(&chain.pose(), target, local);
        if current_cost < threshold {
            debug!("Inverse kinematics: target already reached, cost {:e}", current_cost);
            return Ok(IkSolution {
                configuration: start,
                cost: current_cost,
                evaluations: 0,
                converged: true,
            });
        }

        let free: Vec<usize> = (0..chain.number_of_joints())
            .filter(|&i| !chain.joints()[i].locked())
            .collect();
        if free.is_empty() {
            debug!("Inverse kinematics: all joints locked, cost {:e}", current_cost);
            return Ok(IkSolution {
                configuration: start,
                cost: current_cost,
                evaluations: 0,
                converged: false,
            });
        }

        let (lower, upper): (Vec<f64>, Vec<f64>) = free
            .iter()
            .map(|&i| self.search_bounds(chain, i, bounds[i]))
            .unzip();
        let x0: Vec<f64> = free
            .iter()
            .enumerate()
            .map(|(k, &i)| clamp(start[i], lower[k], upper[k]))
            .collect();

        let mut q = start.clone();
        let cost = |x: &[f64]| -> f64 {
            for (k, &i) in free.iter().enumerate() {
                q[i] = x[k];
            }
            match chain.move_to(&q, &options) {
                Ok(pose) => pose_error(&pose, target, local),
                Err(_) => f64::INFINITY,
            }
        };

        debug!(
            "Inverse kinematics over joints {:?}, lower {:?}, upper {:?}, initial cost {:e}",
            free, lower, upper, current_cost
        );
        let annealing = DualAnnealing::new(self.parameters);
        let minimum = annealing.minimize(cost, &lower, &upper, &x0, threshold, stop)?;

        let mut configuration = start;
        if is_valid(&minimum.x) {
            for (k, &i) in free.iter().enumerate() {
                configuration[i] = minimum.x[k];
            }
        }
        chain.move_to(&configuration, &options)?;

        let converged = minimum.value < threshold;
        debug!(
            "Inverse kinematics {} after {} evaluations, cost {:e}{}",
            if converged { "converged" } else { "did not converge" },
            minimum.evaluations,
            minimum.value,
            if minimum.cancelled { " (cancelled)" } else { "" }
        );
        Ok(IkSolution {
            configuration,
            cost: minimum.value,
            evaluations: minimum.evaluations,
            converged,
        })
    }

    /// Finite search range of the joint. A missing limit is replaced using the fallback
    /// range: both sides missing gives `[-range, range]`, one side missing puts the other
    /// side `2 * range` away from the finite limit. Limits are not used at all if the
    /// joint ignores them.
    fn search_bounds(&self, chain: &KinematicChain, index: usize, bounds: (f64, f64)) -> (f64, f64) {
        let joint = &chain.joints()[index];
        let range = match joint.joint_type() {
            JointType::Revolute => PI,
            JointType::Prismatic => self.parameters.unbounded_range,
        };
        let (lower, upper) = if joint.ignore_limits() {
            (f64::NEG_INFINITY, f64::INFINITY)
        } else {
            bounds
        };
        match (lower.is_finite(), upper.is_finite()) {
            (true, true) => (lower, upper),
            (true, false) => (lower, lower + 2.0 * range),
            (false, true) => (upper - 2.0 * range, upper),
            (false, false) => (-range, range),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint::Joint;
    use std::sync::atomic::Ordering;

    const TOLERANCE: f64 = 1e-3;

    /// x and y stage carrying a rotation stage about z.
    fn xy_theta() -> KinematicChain {
        let joints = vec![
            Joint::prismatic(Vector3::x(), Vector3::zeros()).expect("valid").with_limits(-100.0, 100.0),
            Joint::prismatic(Vector3::y(), Vector3::zeros()).expect("valid").with_limits(-100.0, 100.0),
            Joint::revolute(Vector3::z(), Vector3::zeros()).expect("valid").with_limits(-PI, PI),
        ];
        KinematicChain::new(joints, None, None)
    }

    fn target(position: [f64; 3], direction: [f64; 3]) -> IkTarget {
        IkTarget {
            position: Vector3::new(position[0], position[1], position[2]),
            direction: Vector3::new(direction[0], direction[1], direction[2]),
        }
    }

    fn local_x() -> IkLocal {
        IkLocal { point: Vector3::zeros(), direction: Vector3::x() }
    }

    #[test]
    fn test_pose_error() {
        let pose = Pose::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let local = IkLocal::origin();
        assert_eq!(pose_error(&pose, &target([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]), &local), 0.0);
        assert!((pose_error(&pose, &target([1.0, 2.0, 0.0], [0.0, 0.0, 1.0]), &local) - 4.0).abs() < 1e-12);
        assert!((pose_error(&pose, &target([1.0, 0.0, 0.0], [0.0, 0.0, -1.0]), &local) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_reachable_target() {
        let mut chain = xy_theta();
        let bounds = chain.bounds();
        let solver = IkSolver::new(SolverParameters::default(), TOLERANCE);
        let target = target([10.0, -20.0, 0.0], [0.0, 1.0, 0.0]);

        let solution = solver.solve(&mut chain, &target, &local_x(), &bounds, None).expect("valid bounds");
        assert!(solution.converged, "Cost {}", solution.cost);
        assert!(solution.cost < TOLERANCE * TOLERANCE);
        assert!((solution.configuration[0] - 10.0).abs() < 0.01);
        assert!((solution.configuration[1] + 20.0).abs() < 0.01);
        assert!((solution.configuration[2] - PI / 2.0).abs() < 0.01);

        // Chain is left at the solution
        assert_eq!(chain.configuration(), solution.configuration);
        assert!(pose_error(&chain.pose(), &target, &local_x()) < TOLERANCE * TOLERANCE);
    }

    #[test]
    fn test_early_exit() {
        let mut chain = xy_theta();
        let bounds = chain.bounds();
        chain.move_to(&[1.0, 2.0, 0.0], &FkOptions::default()).expect("length matches");
        let solver = IkSolver::new(SolverParameters::default(), TOLERANCE);
        let solution = solver
            .solve(&mut chain, &target([1.0, 2.0, 0.0], [1.0, 0.0, 0.0]), &local_x(), &bounds, None)
            .expect("valid bounds");
        assert_eq!(solution.evaluations, 0);
        assert!(solution.converged);
        assert_eq!(solution.configuration, vec![1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_locked_joint_is_kept() {
        let mut chain = xy_theta();
        let bounds = chain.bounds();
        chain.move_to(&[0.0, 5.0, 0.0], &FkOptions::default()).expect("length matches");
        chain.joint_mut(1).expect("exists").set_locked(true);

        let solver = IkSolver::new(SolverParameters::default(), TOLERANCE);
        // y cannot be reached with y stage locked
        let target = target([3.0, -4.0, 0.0], [1.0, 0.0, 0.0]);
        let solution = solver.solve(&mut chain, &target, &local_x(), &bounds, None).expect("valid bounds");
        assert_eq!(solution.configuration[1], 5.0);
        assert!(!solution.converged);
        assert!((solution.configuration[0] - 3.0).abs() < 0.01);
        // Best achievable is the y miss alone
        assert!((solution.cost - 81.0).abs() < 1e-3);
    }

    #[test]
    fn test_unbounded_joints_use_fallback() {
        let joints = vec![
            Joint::prismatic(Vector3::x(), Vector3::zeros()).expect("valid"),
            Joint::revolute(Vector3::z(), Vector3::zeros()).expect("valid"),
        ];
        let mut chain = KinematicChain::new(joints, None, None);
        let solver = IkSolver::new(SolverParameters::default(), TOLERANCE);
        assert_eq!(solver.search_bounds(&chain, 0, chain.bounds()[0]), (-1000.0, 1000.0));
        assert_eq!(solver.search_bounds(&chain, 1, chain.bounds()[1]), (-PI, PI));

        let bounds = chain.bounds();
        let solution = solver
            .solve(&mut chain, &target([250.0, 0.0, 0.0], [0.0, -1.0, 0.0]), &local_x(), &bounds, None)
            .expect("valid bounds");
        assert!(solution.converged, "Cost {}", solution.cost);
        assert!((solution.configuration[0] - 250.0).abs() < 0.01);
        assert!((solution.configuration[1] + PI / 2.0).abs() < 0.01);
    }

    #[test]
    fn test_one_sided_limit_anchors_search() {
        let joints = vec![
            Joint::new(Vector3::x(), Vector3::zeros(), JointType::Prismatic, 1600.0, Some(1500.0), None)
                .expect("valid"),
            Joint::new(Vector3::z(), Vector3::zeros(), JointType::Revolute, 0.0, None, Some(-1.0))
                .expect("valid"),
        ];
        let mut chain = KinematicChain::new(joints, None, None);
        let solver = IkSolver::new(SolverParameters::default(), TOLERANCE);
        assert_eq!(solver.search_bounds(&chain, 0, chain.bounds()[0]), (1500.0, 3500.0));
        assert_eq!(solver.search_bounds(&chain, 1, chain.bounds()[1]), (-1.0 - 2.0 * PI, -1.0));

        // Lock the rotation so only the stage beyond the fallback range moves
        chain.joint_mut(1).expect("exists").set_locked(true);
        let bounds = chain.bounds();
        let solution = solver
            .solve(&mut chain, &target([2000.0, 0.0, 0.0], [1.0, 0.0, 0.0]), &local_x(), &bounds, None)
            .expect("valid bounds");
        assert!(solution.converged, "Cost {}", solution.cost);
        assert!((solution.configuration[0] - 2000.0).abs() < 0.01);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut chain = xy_theta();
        let bounds = chain.bounds();
        let parameters = SolverParameters { restart_temperature_ratio: 1.5, ..SolverParameters::default() };
        let solver = IkSolver::new(parameters, TOLERANCE);
        let result = solver.solve(&mut chain, &target([10.0, 0.0, 0.0], [1.0, 0.0, 0.0]), &local_x(), &bounds, None);
        assert!(matches!(result, Err(KinematicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_ignore_limits_widens_search() {
        let mut chain = xy_theta();
        chain.joint_mut(0).expect("exists").set_ignore_limits(true);
        let solver = IkSolver::new(SolverParameters::default(), TOLERANCE);
        assert_eq!(solver.search_bounds(&chain, 0, (-100.0, 100.0)), (-1000.0, 1000.0));
        assert_eq!(solver.search_bounds(&chain, 1, (-100.0, 100.0)), (-100.0, 100.0));
    }

    #[test]
    fn test_cancelled() {
        let mut chain = xy_theta();
        let bounds = chain.bounds();
        let stop = AtomicBool::new(false);
        stop.store(true, Ordering::Relaxed);
        let solver = IkSolver::new(SolverParameters::default(), TOLERANCE);
        let solution = solver
            .solve(&mut chain, &target([10.0, 10.0, 0.0], [1.0, 0.0, 0.0]), &local_x(), &bounds, Some(&stop))
            .expect("valid bounds");
        assert!(!solution.converged);
        assert_eq!(solution.evaluations, 1);
        assert_eq!(solution.configuration, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_bounds_length_checked() {
        let mut chain = xy_theta();
        let solver = IkSolver::new(SolverParameters::default(), TOLERANCE);
        let result = solver.solve(&mut chain, &target([1.0, 0.0, 0.0], [1.0, 0.0, 0.0]), &local_x(), &[(0.0, 1.0)], None);
        assert!(matches!(result, Err(KinematicsError::InvalidLength { expected: 3, found: 1 })));
    }
}
