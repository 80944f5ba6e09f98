//! Typed failures of the kinematics core.
//!
//! Protocol-level problems (malformed command text) never appear here; the
//! controller turns them into `Error: ...` response strings. The errors below
//! propagate to the direct caller and are always recoverable: nothing in this
//! crate terminates the host process.

use std::error::Error;
use std::fmt;

/// Raised when the arm is wired or driven inconsistently with its
/// configuration. Fatal to the call, not to the arm.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A supplied vector does not have one entry per active joint.
    ArityMismatch { expected: usize, found: usize },
    /// Linear velocity must be >= 0.
    NegativeVelocity(f64),
    /// An operation needing the end effector pose ran before one was wired.
    MissingEndEffector,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigurationError::ArityMismatch { expected, found } => {
                write!(f, "one value for every active joint: expected {}, found {}", expected, found)
            }
            ConfigurationError::NegativeVelocity(v) => {
                write!(f, "linear velocity must be >= 0, got {}", v)
            }
            ConfigurationError::MissingEndEffector => {
                write!(f, "no end effector")
            }
        }
    }
}

impl Error for ConfigurationError {}

/// Numerical failures of the kinematics algorithms.
#[derive(Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// The input pose cannot be expressed with Denavit-Hartenberg parameters.
    /// This is a precondition violation by the caller, not a rounding issue.
    NotDhCompatible(String),
    /// The Jacobian solve is numerically unstable beyond tolerance. The
    /// caller may retry with another strategy or drop the current tick.
    Singular(String),
    /// A computed joint velocity is NaN or exceeds the per-joint limit.
    /// The controller drops the tick's motion on this error.
    OutOfRange(String),
}

impl fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KinematicsError::NotDhCompatible(msg) => {
                write!(f, "pose is not DH compatible: {}", msg)
            }
            KinematicsError::Singular(msg) => {
                write!(f, "jacobian is singular: {}", msg)
            }
            KinematicsError::OutOfRange(msg) => {
                write!(f, "joint velocity out of range: {}", msg)
            }
        }
    }
}

impl Error for KinematicsError {}
