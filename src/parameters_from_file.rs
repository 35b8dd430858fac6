//! Supports reading inverse kinematics solver parameters from YAML file (optional)

use std::path::Path;

use yaml_rust2::{Yaml, YamlLoader};

use crate::kinematics_error::KinematicsError;
use crate::parameters::solver::SolverParameters;

const ROOT_KEY: &str = "inverse_kinematics_solver";

impl SolverParameters {
    /// Read the solver parameters from YAML file. YAML file like this is supported:
    /// ```yaml
    /// inverse_kinematics_solver:
    ///   max_iterations: 100
    ///   seed: 10
    ///   initial_temperature: 500.0
    ///   restart_temperature_ratio: 2.0e-5
    ///   visit: 2.62
    ///   accept: -5.0
    ///   max_evaluations: 10000000
    ///   local_search: true
    ///   unbounded_range: 1000.0
    /// ```
    /// Every key is optional, missing keys take the default value. The output of
    /// [`SolverParameters::to_yaml`] can be read back.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, KinematicsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Same as [`SolverParameters::from_yaml_file`], but for YAML content already in memory.
    pub fn from_yaml_str(contents: &str) -> Result<Self, KinematicsError> {
        let docs = YamlLoader::load_from_str(contents)
            .map_err(|e| KinematicsError::ParseError(format!("{}", e)))?;
        let Some(doc) = docs.first() else {
            return Ok(SolverParameters::default());
        };
        let root = &doc[ROOT_KEY];
        if root.is_badvalue() {
            return Err(KinematicsError::ParseError(format!("missing '{}' section", ROOT_KEY)));
        }

        let defaults = SolverParameters::default();
        let parameters = SolverParameters {
            max_iterations: read_count(root, "max_iterations", defaults.max_iterations)?,
            seed: read_count(root, "seed", defaults.seed as usize)? as u64,
            initial_temperature: read_real(root, "initial_temperature", defaults.initial_temperature)?,
            restart_temperature_ratio: read_real(
                root, "restart_temperature_ratio", defaults.restart_temperature_ratio,
            )?,
            visit: read_real(root, "visit", defaults.visit)?,
            accept: read_real(root, "accept", defaults.accept)?,
            max_evaluations: read_count(root, "max_evaluations", defaults.max_evaluations)?,
            local_search: read_flag(root, "local_search", defaults.local_search)?,
            unbounded_range: read_real(root, "unbounded_range", defaults.unbounded_range)?,
        };
        parameters.validate()?;
        Ok(parameters)
    }
}

fn read_real(root: &Yaml, key: &str, default: f64) -> Result<f64, KinematicsError> {
    let value = match &root[key] {
        Yaml::BadValue => return Ok(default),
        Yaml::Integer(i) => Some(*i as f64),
        other => other.as_f64(),
    };
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(KinematicsError::ParseError(format!(
            "'{}' must be a finite number", key
        ))),
    }
}

fn read_count(root: &Yaml, key: &str, default: usize) -> Result<usize, KinematicsError> {
    match &root[key] {
        Yaml::BadValue => Ok(default),
        Yaml::Integer(i) if *i >= 0 => Ok(*i as usize),
        _ => Err(KinematicsError::ParseError(format!(
            "'{}' must be a non-negative integer", key
        ))),
    }
}

fn read_flag(root: &Yaml, key: &str, default: bool) -> Result<bool, KinematicsError> {
    match &root[key] {
        Yaml::BadValue => Ok(default),
        Yaml::Boolean(b) => Ok(*b),
        _ => Err(KinematicsError::ParseError(format!("'{}' must be true or false", key))),
    }
}
