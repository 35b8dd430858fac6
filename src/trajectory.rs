//! Joint space trajectories between two configurations.
//!
//! Every joint follows its own cubic polynomial with zero velocity at both ends, so the
//! positioner starts and stops smoothly. Joints are only synchronized by the number of
//! steps: a joint that needs to travel further simply moves faster.

use nalgebra::{DMatrix, Matrix4, Vector4};

use crate::kinematics_error::{check_length, KinematicsError};

/// Cubic `p(t) = a0 + a1 t + a2 t² + a3 t³` with prescribed positions and velocities at
/// `t0` and `tf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicPolynomial {
    /// Coefficients, lowest order first.
    pub coefficients: [f64; 4],
}

impl CubicPolynomial {
    /// Solves the 4x4 boundary condition system for the coefficients. Returns None if
    /// the system is singular (`t0 == tf`).
    pub fn fit(t0: f64, tf: f64, p0: f64, v0: f64, p1: f64, v1: f64) -> Option<Self> {
        let t0_2 = t0 * t0;
        let t0_3 = t0_2 * t0;
        let tf_2 = tf * tf;
        let tf_3 = tf_2 * tf;

        let m = Matrix4::new(
            1.0, t0, t0_2, t0_3,
            0.0, 1.0, 2.0 * t0, 3.0 * t0_2,
            1.0, tf, tf_2, tf_3,
            0.0, 1.0, 2.0 * tf, 3.0 * tf_2,
        );
        let b = Vector4::new(p0, v0, p1, v1);
        let a = m.lu().solve(&b)?;
        Some(CubicPolynomial { coefficients: [a[0], a[1], a[2], a[3]] })
    }

    pub fn value(&self, t: f64) -> f64 {
        let [a0, a1, a2, a3] = self.coefficients;
        ((a3 * t + a2) * t + a1) * t + a0
    }

    /// First derivative
    pub fn velocity(&self, t: f64) -> f64 {
        let [_, a1, a2, a3] = self.coefficients;
        (3.0 * a3 * t + 2.0 * a2) * t + a1
    }
}

/// Generates `steps` values from `p0` to `p1` (both inclusive) following a cubic with
/// zero velocity at both ends. The polynomial spans `t ∈ [0, steps]` and is sampled at
/// `steps` equally spaced points including both ends.
pub fn cubic_polynomial_trajectory(p0: f64, p1: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => return Vec::new(),
        1 => return vec![p1],
        _ => {}
    }

    let tf = steps as f64;
    let Some(polynomial) = CubicPolynomial::fit(0.0, tf, p0, 0.0, p1, 0.0) else {
        return vec![p1; steps];
    };
    let dt = tf / (steps - 1) as f64;
    (0..steps).map(|i| polynomial.value(i as f64 * dt)).collect()
}

/// Sequence of configurations, one row per step and one column per joint.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    matrix: DMatrix<f64>,
}

impl Trajectory {
    pub fn steps(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn dof(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.nrows() == 0
    }

    /// Configuration at the given step
    pub fn row(&self, step: usize) -> Vec<f64> {
        self.matrix.row(step).iter().copied().collect()
    }

    pub fn first(&self) -> Option<Vec<f64>> {
        (!self.is_empty()).then(|| self.row(0))
    }

    pub fn last(&self) -> Option<Vec<f64>> {
        (!self.is_empty()).then(|| self.row(self.steps() - 1))
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Iterates over configurations, start to stop.
    pub fn iter(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        (0..self.steps()).map(|step| self.row(step))
    }
}

/// Generates the trajectory from `start` to `stop` configuration (both inclusive) in
/// the given number of steps, computing the cubic for every joint independently.
pub fn joint_space_trajectory(start: &[f64], stop: &[f64], steps: usize) -> Result<Trajectory, KinematicsError> {
    check_length(start.len(), stop.len())?;

    let columns: Vec<Vec<f64>> = start
        .iter()
        .zip(stop)
        .map(|(&p0, &p1)| cubic_polynomial_trajectory(p0, p1, steps))
        .collect();

    let matrix = DMatrix::from_fn(steps, start.len(), |step, joint| columns[joint][step]);
    Ok(Trajectory { matrix })
}
