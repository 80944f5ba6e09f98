//! Approximate Jacobian of the arm: the instantaneous mapping between joint
//! velocities (degrees per second, one column per active joint) and the
//! Cartesian velocity of the end effector (3 linear + 3 angular rows).
//!
//! The matrix is recomputed from scratch every time it is needed, as it is
//! only valid for the pose the arm currently holds. The reference strategy
//! builds it by numerical differentiation: perturb each joint by a small
//! epsilon, re-read the end effector pose from the scene, and divide the
//! Cartesian delta by the epsilon. That needs no per-robot analytic
//! derivation; an analytic (screw theory) strategy can be plugged in through
//! [JacobianStrategy] where the derivation exists.

extern crate nalgebra as na;

use crate::chain::KinematicChain;
use crate::errors::{ConfigurationError, KinematicsError};
use crate::joint::HingeRef;
use crate::kinematic_traits::CartesianVector;
use crate::transforms::cartesian_velocity_between;
use crate::utils::all_finite;
use na::linalg::SVD;
use na::{DMatrix, DVector};
use std::fmt;

/// A 6xN Jacobian (N = active joint count) and its solvers.
pub struct ApproximateJacobian {
    matrix: DMatrix<f64>,

    /// Singular values below this are treated as zero when pseudo-inverting.
    tolerance: f64,
}

impl ApproximateJacobian {
    /// Wraps an externally computed Jacobian, e.g. from an analytic strategy.
    /// The matrix must have 6 rows.
    pub fn from_matrix(matrix: DMatrix<f64>, tolerance: f64) -> Self {
        assert_eq!(matrix.nrows(), 6, "a Jacobian maps joint space to a 6D Cartesian velocity");
        Self { matrix, tolerance }
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Joint velocities that produce the desired Cartesian velocity of the
    /// end effector, one entry per active joint in chain order.
    ///
    /// A square, well-conditioned Jacobian is inverted exactly. Otherwise
    /// the Moore-Penrose pseudo-inverse yields the least-squares best effort,
    /// which stays usable near singularities. [KinematicsError::Singular] is
    /// returned only on hard numerical failure: the pseudo-inverse cannot be
    /// computed, or the solution contains non-finite values.
    pub fn joint_from_cartesian(
        &self,
        cartesian: &CartesianVector,
    ) -> Result<Vec<f64>, KinematicsError> {
        if !all_finite(self.matrix.as_slice()) {
            return Err(KinematicsError::Singular(
                "jacobian contains non-finite entries".to_string(),
            ));
        }
        let rhs = DVector::from_row_slice(cartesian.as_slice());

        let solution = if self.matrix.is_square() {
            match self.matrix.clone().try_inverse() {
                Some(inverse) => inverse * &rhs,
                None => self.pseudo_solve(&rhs)?,
            }
        } else {
            self.pseudo_solve(&rhs)?
        };

        if !all_finite(solution.as_slice()) {
            return Err(KinematicsError::Singular(
                "solution contains non-finite joint velocities".to_string(),
            ));
        }
        Ok(solution.iter().copied().collect())
    }

    fn pseudo_solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, KinematicsError> {
        let svd = SVD::new(self.matrix.clone(), true, true);
        match svd.pseudo_inverse(self.tolerance) {
            Ok(pseudo_inverse) => Ok(pseudo_inverse * rhs),
            Err(message) => Err(KinematicsError::Singular(message.to_string())),
        }
    }
}

impl fmt::Display for ApproximateJacobian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.matrix.nrows() {
            let mut row_str = String::new();
            for col in 0..self.matrix.ncols() {
                row_str.push_str(&format!("{:9.4} ", self.matrix[(row, col)]));
            }
            writeln!(f, "[{}]", row_str.trim_end())?;
        }
        Ok(())
    }
}

/// A way to obtain the Jacobian for the chain's current pose. Selectable per
/// arm; [FiniteDifferences] is the default.
pub trait JacobianStrategy {
    fn compute(&self, chain: &KinematicChain) -> Result<ApproximateJacobian, ConfigurationError>;
}

/// The numerical-differentiation strategy.
pub struct FiniteDifferences {
    /// The perturbation applied to each joint, degrees.
    pub epsilon: f64,
}

impl Default for FiniteDifferences {
    fn default() -> Self {
        Self { epsilon: 1e-6 }
    }
}

/// Puts the original angle back when dropped, so a panic while reading the
/// perturbed pose cannot leave the joint displaced.
struct AngleRestore {
    hinge: HingeRef,
    angle: f64,
}

impl Drop for AngleRestore {
    fn drop(&mut self) {
        self.hinge.borrow_mut().set_angle(self.angle);
    }
}

impl JacobianStrategy for FiniteDifferences {
    fn compute(&self, chain: &KinematicChain) -> Result<ApproximateJacobian, ConfigurationError> {
        let base = chain
            .end_effector_pose()
            .ok_or(ConfigurationError::MissingEndEffector)?;

        let count = chain.active_joint_count();
        let mut matrix = DMatrix::zeros(6, count);

        for (i, motor) in chain.active_motors().enumerate() {
            let Some(hinge) = motor.hinge() else {
                continue; // active_motors only yields wired motors
            };
            let original = hinge.borrow().angle();
            let restore = AngleRestore {
                hinge: hinge.clone(),
                angle: original,
            };

            hinge.borrow_mut().set_angle(original + self.epsilon);
            let perturbed = chain
                .end_effector_pose()
                .ok_or(ConfigurationError::MissingEndEffector)?;
            drop(restore);

            let column = cartesian_velocity_between(&base, &perturbed) / self.epsilon;
            for row in 0..6 {
                matrix[(row, i)] = column[row];
            }
        }

        Ok(ApproximateJacobian {
            matrix,
            tolerance: self.epsilon,
        })
    }
}
