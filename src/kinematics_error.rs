//! Error handling for the positioner model and its configuration

use std::error::Error;
use std::fmt;
use std::io;

/// Unified error for invalid joint definitions, mismatched configuration vectors and
/// failures while reading solver parameters.
#[derive(Debug)]
pub enum KinematicsError {
    /// The joint axis has (near) zero length so it defines no direction.
    ZeroAxis,
    /// Configuration vector does not match the number of joints.
    InvalidLength { expected: usize, found: usize },
    /// Solver parameter outside of its valid range.
    InvalidParameter(String),
    IoError(io::Error),
    ParseError(String),
}

impl fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            KinematicsError::ZeroAxis =>
                write!(f, "The joint axis cannot be a zero vector"),
            KinematicsError::InvalidLength { expected, found } =>
                write!(f, "Invalid Length: expected {}, found {}", expected, found),
            KinematicsError::InvalidParameter(ref msg) =>
                write!(f, "Invalid Parameter: {}", msg),
            KinematicsError::IoError(ref err) =>
                write!(f, "IO Error: {}", err),
            KinematicsError::ParseError(ref msg) =>
                write!(f, "Parse Error: {}", msg),
        }
    }
}

impl Error for KinematicsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            KinematicsError::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for KinematicsError {
    fn from(err: io::Error) -> Self {
        KinematicsError::IoError(err)
    }
}

/// Verifies that a configuration vector has one value per joint.
pub(crate) fn check_length(expected: usize, found: usize) -> Result<(), KinematicsError> {
    if expected != found {
        return Err(KinematicsError::InvalidLength { expected, found });
    }
    Ok(())
}
