//! Forward and numeric inverse kinematics for sample positioners of scientific instruments
//! (goniometers, translation and rotation stages, small serial robots holding the sample).
//!
//! A positioner is described as an open kinematic chain: an ordered list of revolute and
//! prismatic joints placed on a base pose and carrying a tool pose (the sample holder).
//! Each joint has an axis, a home point, optional limits and can be locked.
//!
//! # Features
//!
//! - Quaternion based pose algebra, interoperable with `nalgebra` (`Matrix4`, `Isometry3`).
//! - Forward kinematics of the whole chain or any contiguous span of joints, either pure
//!   or moving the joints.
//! - Cubic joint space trajectories with zero velocity at both ends, and a clock driven
//!   [`sequence::Sequence`] to animate the positioner along them.
//! - Numeric inverse kinematics ([`inverse::IkSolver`]) that places a point and a
//!   direction given in the sample frame onto a target, honoring locks and limits. The
//!   search is deterministic (fixed seed) and can be cancelled.
//! - Solver parameters can be read from YAML (`allow_filesystem` feature).
//!
//! # Example
//!
//! ```
//! use std::f64::consts::PI;
//! use nalgebra::Vector3;
//! use rs_goniometer::chain::{FkOptions, KinematicChain};
//! use rs_goniometer::joint::Joint;
//!
//! // Rotation stage about z sitting on a translation stage along x
//! let joints = vec![
//!     Joint::prismatic(Vector3::x(), Vector3::zeros()).unwrap(),
//!     Joint::revolute(Vector3::z(), Vector3::zeros()).unwrap(),
//! ];
//! let mut positioner = KinematicChain::new(joints, None, None);
//!
//! let pose = positioner.move_to(&[10.0, PI / 2.0], &FkOptions::default()).unwrap();
//! let sample_point = pose.transform_point(&Vector3::new(1.0, 0.0, 0.0));
//! assert!((sample_point - Vector3::new(10.0, 1.0, 0.0)).norm() < 1e-9);
//! assert_eq!(positioner.configuration(), vec![10.0, PI / 2.0]);
//! ```

pub mod quaternion;
pub mod pose;

pub mod joint;
pub mod chain;

pub mod trajectory;
pub mod sequence;

pub mod annealing;
pub mod inverse;

pub mod parameters;

#[cfg(feature = "allow_filesystem")]
pub mod parameters_from_file;

pub mod kinematics_error;

pub mod utils;
