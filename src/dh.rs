//! [Denavit-Hartenberg parameters](https://en.wikipedia.org/wiki/Denavit%E2%80%93Hartenberg_parameters)
//! for one link of the kinematic chain.
//!
//! The four parameters describe the pose of a link relative to its
//! predecessor: the common normal between two consecutive Z axes defines the
//! new X axis, and the parameters measure offsets and angles along and about
//! these axes. Conversion is provided both ways; converting an arbitrary pose
//! back to parameters validates that the pose satisfies the DH constraints
//! at all, as most rigid transforms do not.

use crate::errors::KinematicsError;
use crate::kinematic_traits::Pose;

/// How far the rotation block of a pose may deviate from the canonical DH
/// form before the pose is rejected as not DH compatible.
const DH_TOLERANCE: f64 = 1e-9;

/// The four Denavit-Hartenberg parameters of one link. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DhParameters {
    /// Distance along the previous Z axis to the common normal.
    pub d: f64,
    /// Length of the common normal. For a revolute joint this is the radius
    /// about the previous Z.
    pub r: f64,
    /// Angle about the common normal that aligns the previous Z axis to the
    /// new Z axis, degrees.
    pub alpha: f64,
    /// Angle about the previous Z axis for the common normal, degrees.
    pub theta: f64,
}

impl DhParameters {
    pub fn new(d: f64, r: f64, alpha: f64, theta: f64) -> Self {
        Self { d, r, alpha, theta }
    }

    /// Builds the homogeneous transform of this link:
    ///
    /// ```text
    /// [ cosθ   -sinθ·cosα   sinθ·sinα   r·cosθ ]
    /// [ sinθ    cosθ·cosα  -cosθ·sinα   r·sinθ ]
    /// [ 0       sinα         cosα        d     ]
    /// [ 0       0            0           1     ]
    /// ```
    pub fn to_matrix(&self) -> Pose {
        let (st, ct) = self.theta.to_radians().sin_cos();
        let (sa, ca) = self.alpha.to_radians().sin_cos();
        Pose::new(
            ct, -st * ca, st * sa, self.r * ct,
            st, ct * ca, -ct * sa, self.r * st,
            0.0, sa, ca, self.d,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Recovers the DH parameters from a pose produced by [Self::to_matrix].
    ///
    /// Fails with [KinematicsError::NotDhCompatible] when the pose does not
    /// satisfy the DH orthogonality constraints: the first two rotation rows
    /// must be orthogonal, the bottom-left rotation entry must be zero and
    /// the remaining bottom row must be a unit vector. A general rigid
    /// transform has more degrees of freedom than the four DH parameters, so
    /// this is a real precondition, not pedantry.
    pub fn from_matrix(m: &Pose) -> Result<Self, KinematicsError> {
        let row01_dot = m[(0, 0)] * m[(1, 0)] + m[(0, 1)] * m[(1, 1)] + m[(0, 2)] * m[(1, 2)];
        let bottom_norm = m[(2, 1)] * m[(2, 1)] + m[(2, 2)] * m[(2, 2)];

        if row01_dot.abs() > DH_TOLERANCE
            || m[(2, 0)].abs() > DH_TOLERANCE
            || (bottom_norm - 1.0).abs() > DH_TOLERANCE
        {
            return Err(KinematicsError::NotDhCompatible(format!(
                "row dot product {:e}, m20 {:e}, bottom row norm² {}",
                row01_dot,
                m[(2, 0)],
                bottom_norm
            )));
        }

        Ok(Self {
            r: m[(0, 3)].hypot(m[(1, 3)]),
            d: m[(2, 3)],
            theta: m[(1, 3)].atan2(m[(0, 3)]).to_degrees(),
            alpha: m[(2, 1)].atan2(m[(2, 2)]).to_degrees(),
        })
    }
}
