//! Core types and the seam towards the host scene graph.

extern crate nalgebra as na;

use na::{Matrix4, Vector6};
use std::cell::RefCell;
use std::rc::Rc;

/// A pose is a homogeneous 4x4 transform with the translation in the last
/// column, matching the row-major convention of the G-code interface:
///
/// ```text
/// [ r00 r01 r02 tx ]
/// [ r10 r11 r12 ty ]
/// [ r20 r21 r22 tz ]
/// [ 0   0   0   1  ]
/// ```
///
/// The rotation block of a valid pose is orthonormal with determinant +1.
pub type Pose = Matrix4<f64>;

/// Cartesian state or velocity of the end effector: three linear components
/// (XYZ, millimeters) followed by three angular components (UVW, Euler XYZ
/// angles in degrees).
pub type CartesianVector = Vector6<f64>;

/// Maximum number of joints a single chain can hold. Slots may stay
/// unassigned; a chain with fewer active joints is valid.
pub const MAX_JOINTS: usize = 6;

/// A pose-bearing entity owned by the host scene graph, such as the end
/// effector or the target of the arm.
///
/// The world pose must reflect the current joint angles every time it is
/// read: the Jacobian solver perturbs joint angles and immediately re-reads
/// the end effector pose through this trait.
pub trait PoseNode {
    /// Current world-space pose of the node.
    fn world_pose(&self) -> Pose;

    /// Commit a new world-space pose.
    fn set_world_pose(&mut self, pose: Pose);

    /// Commit a new pose, interpreted by the host relative to the base of
    /// the robot arm.
    fn set_local_pose(&mut self, pose: Pose);
}

/// Shared handle to a scene node. One arm is one owning actor, so handles
/// are single-threaded; hosts with several arms keep each arm on its own
/// thread.
pub type PoseNodeRef = Rc<RefCell<dyn PoseNode>>;
