//! Defines the parameters of the numeric inverse kinematics solver

pub mod solver {
    use crate::kinematics_error::KinematicsError;

    /// Parameters of the dual annealing search used by the inverse kinematics.
    /// The seed and iteration cap are fixed so that the same problem always gives
    /// the same answer.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct SolverParameters {
        /// Maximal number of global search iterations.
        pub max_iterations: usize,

        /// Seed of the random generator.
        pub seed: u64,

        /// Initial temperature. Higher values let the search visit more distant points
        /// early on.
        pub initial_temperature: f64,

        /// The search restarts from a random point when the temperature falls below
        /// `initial_temperature * restart_temperature_ratio`.
        pub restart_temperature_ratio: f64,

        /// Shape of the visiting distribution (heavier tail for larger values),
        /// must be in (1, 3).
        pub visit: f64,

        /// Acceptance parameter. The lower, the less likely uphill moves are accepted.
        pub accept: f64,

        /// Hard limit on the number of forward kinematics evaluations.
        pub max_evaluations: usize,

        /// Refine promising points with Nelder-Mead simplex descent.
        pub local_search: bool,

        /// Joints without limits are searched in `[-unbounded_range, unbounded_range]`
        /// (prismatic) or `[-π, π]` (revolute).
        pub unbounded_range: f64,
    }

    impl Default for SolverParameters {
        fn default() -> Self {
            SolverParameters {
                max_iterations: 100,
                seed: 10,
                initial_temperature: 500.0,
                restart_temperature_ratio: 2e-5,
                visit: 2.62,
                accept: -5.0,
                max_evaluations: 10_000_000,
                local_search: true,
                unbounded_range: 1000.0,
            }
        }
    }

    impl SolverParameters {
        /// Checks that the parameters describe a search that terminates and does not
        /// produce NaN: `visit` in (1, 3), `accept` in (-1e4, -5], positive
        /// `initial_temperature`, `restart_temperature_ratio` in (0, 1) and positive
        /// `unbounded_range`.
        pub fn validate(&self) -> Result<(), KinematicsError> {
            if !(self.visit > 1.0 && self.visit < 3.0) {
                return Err(invalid("visit must be in (1, 3)", self.visit));
            }
            if !(self.accept > -1e4 && self.accept <= -5.0) {
                return Err(invalid("accept must be in (-1e4, -5]", self.accept));
            }
            if !(self.initial_temperature > 0.0 && self.initial_temperature.is_finite()) {
                return Err(invalid("initial_temperature must be positive", self.initial_temperature));
            }
            if !(self.restart_temperature_ratio > 0.0 && self.restart_temperature_ratio < 1.0) {
                return Err(invalid(
                    "restart_temperature_ratio must be in (0, 1)",
                    self.restart_temperature_ratio,
                ));
            }
            if !(self.unbounded_range > 0.0 && self.unbounded_range.is_finite()) {
                return Err(invalid("unbounded_range must be positive", self.unbounded_range));
            }
            Ok(())
        }

        /// Convert to string yaml representation (quick viewing, etc).
        pub fn to_yaml(&self) -> String {
            format!(
                "inverse_kinematics_solver:\n  \
              max_iterations: {}\n  \
              seed: {}\n  \
              initial_temperature: {}\n  \
              restart_temperature_ratio: {}\n  \
              visit: {}\n  \
              accept: {}\n  \
              max_evaluations: {}\n  \
              local_search: {}\n  \
              unbounded_range: {}\n",
                self.max_iterations,
                self.seed,
                self.initial_temperature,
                self.restart_temperature_ratio,
                self.visit,
                self.accept,
                self.max_evaluations,
                self.local_search,
                self.unbounded_range
            )
        }
    }

    fn invalid(message: &str, value: f64) -> KinematicsError {
        KinematicsError::InvalidParameter(format!("{} (got {})", message, value))
    }
}

#[cfg(test)]
mod tests {
    use super::solver::SolverParameters;
    use crate::kinematics_error::KinematicsError;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SolverParameters::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let defaults = SolverParameters::default();
        let invalid = [
            SolverParameters { visit: 1.0, ..defaults },
            SolverParameters { visit: 3.2, ..defaults },
            SolverParameters { accept: 0.5, ..defaults },
            SolverParameters { initial_temperature: 0.0, ..defaults },
            SolverParameters { restart_temperature_ratio: 1.0, ..defaults },
            SolverParameters { restart_temperature_ratio: 1.5, ..defaults },
            SolverParameters { restart_temperature_ratio: 0.0, ..defaults },
            SolverParameters { unbounded_range: -1.0, ..defaults },
            SolverParameters { visit: f64::NAN, ..defaults },
        ];
        for parameters in invalid {
            assert!(
                matches!(parameters.validate(), Err(KinematicsError::InvalidParameter(_))),
                "Accepted {:?}", parameters
            );
        }
    }
}
