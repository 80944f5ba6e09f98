//! Conversions between pose matrices, Euler XYZ angles and the Cartesian
//! 6-vector used on the protocol wire.
//!
//! The angular convention everywhere is Euler XYZ about fixed axes: roll U
//! about X first, then pitch V about Y, then yaw W about Z, so the combined
//! rotation is `Rz(w) * Ry(v) * Rx(u)`. Composition and decomposition are
//! exact inverses of each other for any rotation matrix, up to the usual
//! ambiguity at the |pitch| = 90° gimbal lock where roll is folded into yaw.

extern crate nalgebra as na;

use crate::kinematic_traits::{CartesianVector, Pose};
use na::Vector3;

/// Builds a pose with the given Euler XYZ rotation (radians) and zero
/// translation.
pub fn euler_xyz_to_matrix(radians: &Vector3<f64>) -> Pose {
    let (sr, cr) = radians.x.sin_cos();
    let (sp, cp) = radians.y.sin_cos();
    let (sy, cy) = radians.z.sin_cos();

    Pose::new(
        cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr, 0.0,
        sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr, 0.0,
        -sp, cp * sr, cp * cr, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Extracts the Euler XYZ angles (radians) from the rotation block of the
/// pose. At gimbal lock (|pitch| = 90°) yaw is reported as zero and the
/// remaining rotation as roll.
pub fn matrix_to_euler_xyz(m: &Pose) -> Vector3<f64> {
    let sp = (-m[(2, 0)]).clamp(-1.0, 1.0);
    let pitch = sp.asin();

    if sp.abs() > 1.0 - 1e-12 {
        // cos(pitch) is zero; roll and yaw rotate about the same axis.
        let roll = if sp > 0.0 {
            m[(0, 1)].atan2(m[(0, 2)])
        } else {
            (-m[(0, 1)]).atan2(-m[(0, 2)])
        };
        return Vector3::new(roll, pitch, 0.0);
    }

    let roll = m[(2, 1)].atan2(m[(2, 2)]);
    let yaw = m[(1, 0)].atan2(m[(0, 0)]);
    Vector3::new(roll, pitch, yaw)
}

/// The XYZ translation and UVW rotation (degrees) of the given pose. This is
/// the form the `G1` and `ik` commands speak.
pub fn cartesian_from_pose(pose: &Pose) -> CartesianVector {
    let rotate = matrix_to_euler_xyz(pose);
    CartesianVector::new(
        pose[(0, 3)],
        pose[(1, 3)],
        pose[(2, 3)],
        rotate.x.to_degrees(),
        rotate.y.to_degrees(),
        rotate.z.to_degrees(),
    )
}

/// The pose that represents the given Cartesian position: XYZ translation
/// and UVW rotation in degrees.
pub fn pose_from_cartesian(cartesian: &CartesianVector) -> Pose {
    let rotate = Vector3::new(
        cartesian[3].to_radians(),
        cartesian[4].to_radians(),
        cartesian[5].to_radians(),
    );
    let mut pose = euler_xyz_to_matrix(&rotate);
    pose[(0, 3)] = cartesian[0];
    pose[(1, 3)] = cartesian[1];
    pose[(2, 3)] = cartesian[2];
    pose
}

/// Cartesian difference driving pose `from` towards pose `to`: the linear
/// part is the translation difference, the angular part the difference of
/// the Euler XYZ angles in degrees.
pub fn cartesian_velocity_between(from: &Pose, to: &Pose) -> CartesianVector {
    cartesian_from_pose(to) - cartesian_from_pose(from)
}
