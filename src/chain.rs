//! The kinematic chain: up to [MAX_JOINTS] named motors in order from the
//! base, an optional gripper motor, and the end effector and target pose
//! nodes the control loop works against.
//!
//! Slots without a motor, and motors without a hinge, are skipped by every
//! computation: "number of joints" always means the count of assigned,
//! wired joints, and joint vectors have exactly that many entries.

use crate::errors::ConfigurationError;
use crate::joint::Motor;
use crate::kinematic_traits::{MAX_JOINTS, Pose, PoseNodeRef};
use tracing::warn;

#[derive(Default)]
pub struct KinematicChain {
    motors: [Option<Motor>; MAX_JOINTS],
    gripper: Option<Motor>,
    end_effector: Option<PoseNodeRef>,
    target: Option<PoseNodeRef>,
    linear_velocity: f64,
}

impl KinematicChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the motor in the first unassigned slot. A full chain ignores
    /// the motor.
    pub fn add_motor(&mut self, motor: Motor) {
        match self.motors.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(motor),
            None => warn!("all {} joint slots assigned, ignoring motor {}", MAX_JOINTS, motor.name()),
        }
    }

    /// Assigns or clears one joint slot.
    ///
    /// # Panics
    ///
    /// Panics if `index >= MAX_JOINTS`.
    pub fn set_motor(&mut self, index: usize, motor: Option<Motor>) {
        self.motors[index] = motor;
    }

    pub fn motor(&self, index: usize) -> Option<&Motor> {
        self.motors.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn gripper(&self) -> Option<&Motor> {
        self.gripper.as_ref()
    }

    pub fn set_gripper(&mut self, motor: Option<Motor>) {
        self.gripper = motor;
    }

    pub fn end_effector(&self) -> Option<&PoseNodeRef> {
        self.end_effector.as_ref()
    }

    pub fn set_end_effector(&mut self, node: Option<PoseNodeRef>) {
        self.end_effector = node;
    }

    pub fn target(&self) -> Option<&PoseNodeRef> {
        self.target.as_ref()
    }

    pub fn set_target(&mut self, node: Option<PoseNodeRef>) {
        self.target = node;
    }

    /// Current world pose of the end effector, if one is wired.
    pub fn end_effector_pose(&self) -> Option<Pose> {
        self.end_effector.as_ref().map(|node| node.borrow().world_pose())
    }

    /// Current world pose of the target, if one is wired.
    pub fn target_pose(&self) -> Option<Pose> {
        self.target.as_ref().map(|node| node.borrow().world_pose())
    }

    /// Moves the target onto the end effector, so the arm holds still until
    /// the next `G1`. Does nothing unless both nodes are wired.
    pub fn set_target_to_end_effector(&mut self) {
        if let (Some(target), Some(pose)) = (self.target.as_ref(), self.end_effector_pose()) {
            target.borrow_mut().set_world_pose(pose);
        }
    }

    /// Motors that are both assigned and wired to a hinge, in chain order.
    pub fn active_motors(&self) -> impl Iterator<Item = &Motor> {
        self.motors
            .iter()
            .flatten()
            .filter(|motor| motor.has_hinge())
    }

    /// The number of assigned, wired joints.
    pub fn active_joint_count(&self) -> usize {
        self.active_motors().count()
    }

    /// One angle per active joint, in chain order. The vector length equals
    /// [Self::active_joint_count], not [MAX_JOINTS].
    pub fn joint_angles(&self) -> Vec<f64> {
        self.active_motors()
            .filter_map(|motor| motor.hinge())
            .map(|hinge| hinge.borrow().angle())
            .collect()
    }

    /// Sets every active joint's angle, in chain order.
    pub fn set_joint_angles(&mut self, values: &[f64]) -> Result<(), ConfigurationError> {
        self.check_arity(values.len())?;
        for (motor, value) in self.active_motors().zip(values) {
            if let Some(hinge) = motor.hinge() {
                hinge.borrow_mut().set_angle(*value);
            }
        }
        Ok(())
    }

    /// Sets every active joint's velocity, in chain order.
    pub fn set_joint_velocities(&mut self, values: &[f64]) -> Result<(), ConfigurationError> {
        self.check_arity(values.len())?;
        for (motor, value) in self.active_motors().zip(values) {
            if let Some(hinge) = motor.hinge() {
                hinge.borrow_mut().set_velocity(*value);
            }
        }
        Ok(())
    }

    fn check_arity(&self, found: usize) -> Result<(), ConfigurationError> {
        let expected = self.active_joint_count();
        if found != expected {
            return Err(ConfigurationError::ArityMismatch { expected, found });
        }
        Ok(())
    }

    /// Commanded speed of the end effector towards the target, >= 0.
    pub fn linear_velocity(&self) -> f64 {
        self.linear_velocity
    }

    pub fn set_linear_velocity(&mut self, velocity: f64) -> Result<(), ConfigurationError> {
        if velocity < 0.0 {
            return Err(ConfigurationError::NegativeVelocity(velocity));
        }
        self.linear_velocity = velocity;
        Ok(())
    }

    /// Advances every hinge by its current velocity over `dt` seconds. Hosts
    /// with their own rigid body integration skip this and tick the hinges
    /// themselves.
    pub fn update(&mut self, dt: f64) {
        for motor in self.motors.iter().flatten().chain(self.gripper.iter()) {
            if let Some(hinge) = motor.hinge() {
                hinge.borrow_mut().update(dt);
            }
        }
    }
}
