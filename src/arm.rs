//! The arm controller: converts the state of the robot arm into a Marlin
//! flavored G-code dialect and back, and owns the per-tick loop that drives
//! the end effector towards the target.
//!
//! For motion the controller requires a wired end effector, a wired target
//! and a linear velocity greater than zero; without any of these the arm
//! idles with all joint velocities at zero. Commands arrive as plain ASCII
//! through [RobotArm::send_command]; every response is delivered
//! synchronously to all registered listeners. Command handling is atomic: a
//! malformed command produces an `Error:` response and changes no joint
//! state at all.
//!
//! The controller only sets joint velocities; integrating them into angles
//! is the host's business (or [crate::chain::KinematicChain::update] where
//! no host physics exists).

use crate::chain::KinematicChain;
use crate::errors::{ConfigurationError, KinematicsError};
use crate::jacobian::{FiniteDifferences, JacobianStrategy};
use crate::joint::HingeRef;
use crate::transforms::{cartesian_from_pose, cartesian_velocity_between, pose_from_cartesian};
use crate::utils::{format_double, scale_vector_to_magnitude, sum_of_components};
use tracing::{debug, warn};

/// Below this, a commanded linear velocity or a remaining Cartesian distance
/// counts as zero and the arm idles.
const IDLE_EPSILON: f64 = 1e-4;

/// Default per-joint velocity cap, degrees per second. A solve asking for
/// more than this is treated as impossible and the tick's motion is dropped.
const DEFAULT_MAX_JOINT_VELOCITY: f64 = 100.0;

/// Controller for one robot arm.
pub struct RobotArm {
    chain: KinematicChain,
    strategy: Box<dyn JacobianStrategy>,
    listeners: Vec<Box<dyn Fn(&str)>>,
    max_joint_velocity: f64,
}

impl Default for RobotArm {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotArm {
    /// An arm with an empty chain and the finite-difference Jacobian
    /// strategy.
    pub fn new() -> Self {
        Self::with_strategy(Box::new(FiniteDifferences::default()))
    }

    /// An arm using the given Jacobian strategy, e.g. an analytic one where
    /// the derivation exists for the robot.
    pub fn with_strategy(strategy: Box<dyn JacobianStrategy>) -> Self {
        Self {
            chain: KinematicChain::new(),
            strategy,
            listeners: Vec::new(),
            max_joint_velocity: DEFAULT_MAX_JOINT_VELOCITY,
        }
    }

    pub fn chain(&self) -> &KinematicChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut KinematicChain {
        &mut self.chain
    }

    pub fn max_joint_velocity(&self) -> f64 {
        self.max_joint_velocity
    }

    pub fn set_max_joint_velocity(&mut self, degrees_per_second: f64) {
        self.max_joint_velocity = degrees_per_second;
    }

    /// Registers a response listener. Every response of every command is
    /// delivered to all listeners, synchronously, in registration order.
    pub fn add_listener(&mut self, listener: impl Fn(&str) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn respond(&self, message: &str) {
        for listener in &self.listeners {
            listener(message);
        }
    }

    /// Handles a single command and fires the response at the listeners.
    /// Parse failures never escape as errors; they become `Error: ...`
    /// responses.
    pub fn send_command(&mut self, gcode: &str) {
        debug!("heard {}", gcode);

        let response = if gcode.starts_with("G0") {
            self.parse_g0(gcode)
        } else if gcode == "M114" {
            format!("Ok: M114{}", self.motors_and_feedrate())
        } else if gcode == "ik" {
            self.end_effector_ik()
        } else if gcode == "aj" {
            self.jacobian_dump()
        } else if gcode.starts_with("G1") {
            self.parse_g1(gcode)
        } else {
            "Error: unknown command".to_string()
        };
        self.respond(&response);
    }

    /// One state token per active joint (gripper included), plus the
    /// feedrate: ` X10.00 Y-5.00 Z0.00 F0.00`.
    fn motors_and_feedrate(&self) -> String {
        let mut state = String::new();
        for motor in self.chain.active_motors().chain(self.wired_gripper()) {
            if let Some(hinge) = motor.hinge() {
                state.push_str(&format!(
                    " {}{}",
                    motor.name(),
                    format_double(hinge.borrow().angle())
                ));
            }
        }
        state.push_str(&format!(" F{}", format_double(self.chain.linear_velocity())));
        state
    }

    fn wired_gripper(&self) -> impl Iterator<Item = &crate::joint::Motor> {
        self.chain
            .gripper()
            .into_iter()
            .filter(|motor| motor.has_hinge())
    }

    /// `G0`: rapid non-linear move. Joint angles named in the command are
    /// set directly, bypassing the velocity loop, clamped into each hinge's
    /// travel range. All numbers are parsed before anything is applied.
    fn parse_g0(&mut self, gcode: &str) -> String {
        let parts: Vec<&str> = gcode.split_whitespace().collect();
        let mut moves: Vec<(HingeRef, f64)> = Vec::new();

        for motor in self.chain.active_motors().chain(self.wired_gripper()) {
            let Some(hinge) = motor.hinge() else {
                continue;
            };
            for part in parts.iter().skip(1) {
                if let Some(number) = part.strip_prefix(motor.name()) {
                    match number.parse::<f64>() {
                        Ok(angle) => moves.push((hinge.clone(), angle)),
                        Err(e) => {
                            warn!("G0 rejected, bad number {:?}: {}", part, e);
                            return format!("Error: {}", e);
                        }
                    }
                    break;
                }
            }
            // tokens naming no joint are ignored
        }

        for (hinge, angle) in moves {
            let mut hinge = hinge.borrow_mut();
            let clamped = hinge.clamped(angle);
            hinge.set_angle(clamped);
        }

        format!("Ok: G0{}", self.motors_and_feedrate())
    }

    /// `G1`: linear move. Names the new Cartesian target (XYZ mm, UVW
    /// degrees) and optionally the feedrate `F`. Axes the command does not
    /// name keep the end effector's current value, read once before parsing.
    /// Movement happens on [Self::update] once linear velocity and the time
    /// delta are both greater than zero.
    fn parse_g1(&mut self, gcode: &str) -> String {
        if self.chain.target().is_none() {
            warn!("no target");
            return "Error: no target".to_string();
        }
        let Some(ee_pose) = self.chain.end_effector_pose() else {
            warn!("no end effector");
            return "Error: no end effector".to_string();
        };

        let mut cartesian = cartesian_from_pose(&ee_pose);
        let mut feedrate = None;
        for part in gcode.split_whitespace().skip(1) {
            let Some(axis) = part.chars().next() else {
                continue;
            };
            let number = &part[axis.len_utf8()..];
            let slot = match axis {
                'F' => None,
                'X' => Some(0),
                'Y' => Some(1),
                'Z' => Some(2),
                'U' => Some(3),
                'V' => Some(4),
                'W' => Some(5),
                _ => {
                    warn!("unknown G1 token: {}", part);
                    continue;
                }
            };
            match number.parse::<f64>() {
                Ok(value) => match slot {
                    Some(i) => cartesian[i] = value,
                    None => feedrate = Some(value),
                },
                Err(e) => {
                    warn!("G1 rejected, bad number {:?}: {}", part, e);
                    return format!("Error: {}", e);
                }
            }
        }

        if let Some(feedrate) = feedrate {
            if let Err(e) = self.chain.set_linear_velocity(feedrate) {
                warn!("G1 rejected: {}", e);
                return format!("Error: {}", e);
            }
        }

        // The target position is relative to the base of the robot arm.
        if let Some(target) = self.chain.target() {
            target
                .borrow_mut()
                .set_local_pose(pose_from_cartesian(&cartesian));
        }
        "Ok".to_string()
    }

    /// `ik`: the G1 command that would reproduce the current end effector
    /// pose.
    fn end_effector_ik(&self) -> String {
        let Some(pose) = self.chain.end_effector_pose() else {
            return "Error: no end effector".to_string();
        };
        let cartesian = cartesian_from_pose(&pose);
        format!(
            "Ok: G1 F{} X{} Y{} Z{} U{} V{} W{}",
            format_double(self.chain.linear_velocity()),
            format_double(cartesian[0]),
            format_double(cartesian[1]),
            format_double(cartesian[2]),
            format_double(cartesian[3]),
            format_double(cartesian[4]),
            format_double(cartesian[5]),
        )
    }

    /// `aj`: debug dump of the current Jacobian.
    fn jacobian_dump(&self) -> String {
        match self.strategy.compute(&self.chain) {
            Ok(jacobian) => format!("Ok: {}", jacobian),
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Advances the control loop by `dt` seconds. Joint velocities are set
    /// here; the host integrates them into angles.
    pub fn update(&mut self, dt: f64) {
        if dt == 0.0 {
            return;
        }
        self.move_towards_target();
    }

    fn move_towards_target(&mut self) {
        let (Some(ee_pose), Some(target_pose)) =
            (self.chain.end_effector_pose(), self.chain.target_pose())
        else {
            self.stop_all_joints();
            return;
        };
        if self.chain.linear_velocity() < IDLE_EPSILON {
            self.stop_all_joints();
            return;
        }

        let mut cartesian = cartesian_velocity_between(&ee_pose, &target_pose);
        // Cap at the commanded speed but never above the remaining distance,
        // so the arm does not overshoot and oscillate around the target.
        scale_vector_to_magnitude(&mut cartesian, self.chain.linear_velocity());

        if sum_of_components(&cartesian) < IDLE_EPSILON {
            // arrived
            self.stop_all_joints();
            return;
        }

        let jacobian = match self.strategy.compute(&self.chain) {
            Ok(jacobian) => jacobian,
            Err(e) => {
                warn!("cannot build jacobian, dropping tick: {}", e);
                self.stop_all_joints();
                return;
            }
        };
        let velocities = match jacobian
            .joint_from_cartesian(&cartesian)
            .and_then(|v| self.checked_velocities(v))
        {
            Ok(velocities) => velocities,
            Err(e) => {
                warn!("dropping tick's motion: {}", e);
                self.stop_all_joints();
                return;
            }
        };
        if let Err(e) = self.chain.set_joint_velocities(&velocities) {
            warn!("{}", e);
            self.stop_all_joints();
        }
    }

    /// Rejects an impossible solve: any NaN, or any joint asked to spin
    /// faster than the per-joint cap.
    fn checked_velocities(&self, velocities: Vec<f64>) -> Result<Vec<f64>, KinematicsError> {
        for (i, v) in velocities.iter().enumerate() {
            if v.is_nan() || v.abs() > self.max_joint_velocity {
                return Err(KinematicsError::OutOfRange(format!(
                    "joint {} velocity {} exceeds limit {}",
                    i, v, self.max_joint_velocity
                )));
            }
        }
        Ok(velocities)
    }

    fn stop_all_joints(&mut self) {
        let zeros = vec![0.0; self.chain.active_joint_count()];
        if let Err(e) = self.chain.set_joint_velocities(&zeros) {
            warn!("{}", e);
        }
    }

    /// One angle per active joint, in chain order.
    pub fn all_joint_angles(&self) -> Vec<f64> {
        self.chain.joint_angles()
    }

    pub fn set_all_joint_angles(&mut self, values: &[f64]) -> Result<(), ConfigurationError> {
        self.chain.set_joint_angles(values)
    }

    pub fn set_all_joint_velocities(&mut self, values: &[f64]) -> Result<(), ConfigurationError> {
        self.chain.set_joint_velocities(values)
    }

    pub fn linear_velocity(&self) -> f64 {
        self.chain.linear_velocity()
    }

    pub fn set_linear_velocity(&mut self, velocity: f64) -> Result<(), ConfigurationError> {
        self.chain.set_linear_velocity(velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint::{HingeJoint, Motor};
    use crate::kinematic_traits::{Pose, PoseNode, PoseNodeRef};
    use crate::transforms::euler_xyz_to_matrix;
    use nalgebra::Vector3;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn capture_responses(arm: &mut RobotArm) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        arm.add_listener(move |message| sink.borrow_mut().push(message.to_string()));
        log
    }

    fn last(log: &Rc<RefCell<Vec<String>>>) -> String {
        log.borrow().last().expect("a response was fired").clone()
    }

    fn three_axis_arm() -> (RobotArm, Vec<HingeRef>) {
        let mut arm = RobotArm::new();
        let mut hinges = Vec::new();
        for name in ["X", "Y", "Z"] {
            let hinge = Rc::new(RefCell::new(HingeJoint::new()));
            hinges.push(hinge.clone());
            arm.chain_mut().add_motor(Motor::with_hinge(name, hinge));
        }
        (arm, hinges)
    }

    struct StaticPose {
        pose: Pose,
    }

    impl StaticPose {
        fn shared(pose: Pose) -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self { pose }))
        }
    }

    impl PoseNode for StaticPose {
        fn world_pose(&self) -> Pose {
            self.pose
        }
        fn set_world_pose(&mut self, pose: Pose) {
            self.pose = pose;
        }
        fn set_local_pose(&mut self, pose: Pose) {
            self.pose = pose;
        }
    }

    /// Two-link planar arm with closed-form forward kinematics; the same
    /// geometry the jacobian tests verify against.
    struct PlanarArmScene {
        shoulder: HingeRef,
        elbow: HingeRef,
        l1: f64,
        l2: f64,
    }

    impl PlanarArmScene {
        fn pose_at(&self, shoulder_deg: f64, elbow_deg: f64) -> Pose {
            let a = shoulder_deg.to_radians();
            let b = elbow_deg.to_radians();
            let mut pose = euler_xyz_to_matrix(&Vector3::new(0.0, 0.0, a + b));
            pose[(0, 3)] = self.l1 * a.cos() + self.l2 * (a + b).cos();
            pose[(1, 3)] = self.l1 * a.sin() + self.l2 * (a + b).sin();
            pose
        }
    }

    impl PoseNode for PlanarArmScene {
        fn world_pose(&self) -> Pose {
            self.pose_at(self.shoulder.borrow().angle(), self.elbow.borrow().angle())
        }
        fn set_world_pose(&mut self, _pose: Pose) {}
        fn set_local_pose(&mut self, _pose: Pose) {}
    }

    /// An arm over the planar scene, with a static target node.
    fn planar_arm() -> (RobotArm, Rc<RefCell<PlanarArmScene>>, Rc<RefCell<StaticPose>>) {
        let shoulder = Rc::new(RefCell::new(HingeJoint::new()));
        let elbow = Rc::new(RefCell::new(HingeJoint::new()));
        let scene = Rc::new(RefCell::new(PlanarArmScene {
            shoulder: shoulder.clone(),
            elbow: elbow.clone(),
            l1: 100.0,
            l2: 60.0,
        }));
        let target = StaticPose::shared(scene.borrow().world_pose());

        let mut arm = RobotArm::new();
        arm.chain_mut().add_motor(Motor::with_hinge("X", shoulder));
        arm.chain_mut().add_motor(Motor::with_hinge("Y", elbow));
        arm.chain_mut().set_end_effector(Some(scene.clone() as PoseNodeRef));
        arm.chain_mut().set_target(Some(target.clone() as PoseNodeRef));
        (arm, scene, target)
    }

    #[test]
    fn test_g0_sets_angles_and_reports() {
        let (mut arm, _) = three_axis_arm();
        let log = capture_responses(&mut arm);
        arm.send_command("G0 X10 Y-5");
        assert_eq!(arm.all_joint_angles(), vec![10.0, -5.0, 0.0]);
        assert_eq!(last(&log), "Ok: G0 X10.00 Y-5.00 Z0.00 F0.00");
    }

    #[test]
    fn test_g0_malformed_number_is_atomic() {
        let (mut arm, _) = three_axis_arm();
        let log = capture_responses(&mut arm);
        arm.send_command("G0 X10 Yoops");
        assert!(last(&log).starts_with("Error:"), "got {:?}", last(&log));
        // nothing was applied, not even the well-formed X
        assert_eq!(arm.all_joint_angles(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_g0_clamps_to_hinge_range() {
        let mut arm = RobotArm::new();
        let hinge = Rc::new(RefCell::new(HingeJoint::with_limits(-90.0, 90.0)));
        arm.chain_mut().add_motor(Motor::with_hinge("X", hinge));
        let log = capture_responses(&mut arm);
        arm.send_command("G0 X120");
        assert_eq!(arm.all_joint_angles(), vec![90.0]);
        assert_eq!(last(&log), "Ok: G0 X90.00 F0.00");
    }

    #[test]
    fn test_g0_includes_gripper() {
        let (mut arm, _) = three_axis_arm();
        let gripper = Rc::new(RefCell::new(HingeJoint::new()));
        arm.chain_mut()
            .set_gripper(Some(Motor::with_hinge("T", gripper.clone())));
        let log = capture_responses(&mut arm);
        arm.send_command("G0 T45");
        assert_eq!(gripper.borrow().angle(), 45.0);
        assert_eq!(last(&log), "Ok: G0 X0.00 Y0.00 Z0.00 T45.00 F0.00");
    }

    #[test]
    fn test_unknown_command() {
        let (mut arm, _) = three_axis_arm();
        let log = capture_responses(&mut arm);
        arm.send_command("FOO");
        assert_eq!(last(&log), "Error: unknown command");
        assert_eq!(arm.all_joint_angles(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_m114_reports_state() {
        let (mut arm, _) = three_axis_arm();
        arm.set_all_joint_angles(&[1.0, 2.0, 3.0]).expect("three joints");
        arm.set_linear_velocity(4.0).expect("positive velocity");
        let log = capture_responses(&mut arm);
        arm.send_command("M114");
        assert_eq!(last(&log), "Ok: M114 X1.00 Y2.00 Z3.00 F4.00");
    }

    #[test]
    fn test_g1_without_target() {
        let (mut arm, _) = three_axis_arm();
        let log = capture_responses(&mut arm);
        arm.send_command("G1 X10");
        assert_eq!(last(&log), "Error: no target");
    }

    #[test]
    fn test_g1_without_end_effector() {
        let (mut arm, _) = three_axis_arm();
        let target = StaticPose::shared(Pose::identity());
        arm.chain_mut().set_target(Some(target as PoseNodeRef));
        let log = capture_responses(&mut arm);
        arm.send_command("G1 X10");
        assert_eq!(last(&log), "Error: no end effector");
    }

    #[test]
    fn test_g1_sets_target_and_feedrate() {
        let (mut arm, scene, target) = planar_arm();
        let ee = cartesian_from_pose(&scene.borrow().world_pose());
        let log = capture_responses(&mut arm);

        arm.send_command("G1 X50 F5");
        assert_eq!(last(&log), "Ok");
        assert_eq!(arm.linear_velocity(), 5.0);

        let committed = cartesian_from_pose(&target.borrow().pose);
        assert!((committed[0] - 50.0).abs() < 1e-9, "X was named");
        // unnamed axes keep the end effector's values
        for i in 1..6 {
            assert!((committed[i] - ee[i]).abs() < 1e-9, "axis {} retained", i);
        }
    }

    #[test]
    fn test_g1_negative_feedrate_rejected() {
        let (mut arm, _, target) = planar_arm();
        let before = target.borrow().pose;
        let log = capture_responses(&mut arm);
        arm.send_command("G1 X50 F-2");
        assert!(last(&log).starts_with("Error:"));
        assert_eq!(arm.linear_velocity(), 0.0);
        assert_eq!(target.borrow().pose, before);
    }

    #[test]
    fn test_g1_malformed_number_is_atomic() {
        let (mut arm, _, target) = planar_arm();
        let before = target.borrow().pose;
        let log = capture_responses(&mut arm);
        arm.send_command("G1 X50 Ynope F5");
        assert!(last(&log).starts_with("Error:"));
        assert_eq!(arm.linear_velocity(), 0.0);
        assert_eq!(target.borrow().pose, before);
    }

    #[test]
    fn test_ik_reports_current_pose() {
        let (mut arm, _, _) = planar_arm();
        let log = capture_responses(&mut arm);
        arm.send_command("ik");
        // straight arm: x = 100 + 60
        assert_eq!(
            last(&log),
            "Ok: G1 F0.00 X160.00 Y0.00 Z0.00 U0.00 V0.00 W0.00"
        );
    }

    #[test]
    fn test_aj_dumps_jacobian() {
        let (mut arm, _, _) = planar_arm();
        let log = capture_responses(&mut arm);
        arm.send_command("aj");
        let response = last(&log);
        assert!(response.starts_with("Ok:"), "got {:?}", response);
        assert_eq!(response.trim_end().lines().count(), 6);
    }

    #[test]
    fn test_aj_without_end_effector() {
        let (mut arm, _) = three_axis_arm();
        let log = capture_responses(&mut arm);
        arm.send_command("aj");
        assert_eq!(last(&log), "Error: no end effector");
    }

    #[test]
    fn test_all_listeners_hear_the_response() {
        let (mut arm, _) = three_axis_arm();
        let first = capture_responses(&mut arm);
        let second = capture_responses(&mut arm);
        arm.send_command("M114");
        assert_eq!(first.borrow().len(), 1);
        assert_eq!(second.borrow().len(), 1);
        assert_eq!(last(&first), last(&second));
    }

    #[test]
    fn test_update_with_zero_dt_is_a_no_op() {
        let (mut arm, _, _) = planar_arm();
        arm.set_linear_velocity(5.0).expect("positive velocity");
        arm.set_all_joint_velocities(&[3.0, 3.0]).expect("two joints");
        arm.update(0.0);
        // velocities untouched, the loop never ran
        let chain = arm.chain();
        let velocities: Vec<f64> = chain
            .active_motors()
            .filter_map(|m| m.hinge())
            .map(|h| h.borrow().velocity())
            .collect();
        assert_eq!(velocities, vec![3.0, 3.0]);
    }

    #[test]
    fn test_idle_without_linear_velocity() {
        let (mut arm, _, _) = planar_arm();
        arm.set_all_joint_velocities(&[3.0, -3.0]).expect("two joints");
        arm.update(0.1);
        assert_eq!(collect_velocities(&arm), vec![0.0, 0.0]);
    }

    #[test]
    fn test_arrival_settles_velocities_to_zero() {
        // target equals the end effector pose, so the arm has arrived
        let (mut arm, _, _) = planar_arm();
        arm.set_linear_velocity(5.0).expect("positive velocity");
        arm.set_all_joint_velocities(&[3.0, -3.0]).expect("two joints");
        arm.update(0.1);
        assert_eq!(collect_velocities(&arm), vec![0.0, 0.0]);
    }

    #[test]
    fn test_update_converges_on_reachable_target() {
        let (mut arm, scene, target) = planar_arm();
        let goal = scene.borrow().pose_at(20.0, 30.0);
        target.borrow_mut().set_world_pose(goal);
        arm.set_linear_velocity(10.0).expect("positive velocity");

        let initial_gap =
            sum_of_components(&cartesian_velocity_between(&scene.borrow().world_pose(), &goal));

        let dt = 0.05;
        for _ in 0..2000 {
            arm.update(dt);
            arm.chain_mut().update(dt);
        }

        let final_gap =
            sum_of_components(&cartesian_velocity_between(&scene.borrow().world_pose(), &goal));
        assert!(
            final_gap < 1.0,
            "arm did not converge: gap went from {} to {}",
            initial_gap, final_gap
        );
    }

    #[test]
    fn test_impossible_velocity_drops_the_tick() {
        let (mut arm, scene, target) = planar_arm();
        let goal = scene.borrow().pose_at(20.0, 30.0);
        target.borrow_mut().set_world_pose(goal);
        arm.set_linear_velocity(10.0).expect("positive velocity");
        arm.set_max_joint_velocity(1e-9); // nothing is possible now
        arm.set_all_joint_velocities(&[7.0, 7.0]).expect("two joints");

        let angles_before = arm.all_joint_angles();
        arm.update(0.1);

        // the tick is dropped: no stale velocities keep coasting, no angles move
        assert_eq!(collect_velocities(&arm), vec![0.0, 0.0]);
        assert_eq!(arm.all_joint_angles(), angles_before);
    }

    fn collect_velocities(arm: &RobotArm) -> Vec<f64> {
        arm.chain()
            .active_motors()
            .filter_map(|m| m.hinge())
            .map(|h| h.borrow().velocity())
            .collect()
    }
}
