//! Differential kinematics and a Marlin-style G-code protocol for articulated
//! robot arms with up to 6 rotary joints.
//!
//! The crate models the arm as a [chain::KinematicChain] of named rotary
//! joints wired to externally owned hinges, plus two pose-bearing scene nodes:
//! the end effector and the target. Forward kinematics is supplied by the host
//! scene graph through the [kinematic_traits::PoseNode] seam; this crate only
//! ever reads poses from it. On top of the chain sit:
//!
//! - [dh] — Denavit-Hartenberg parameter construction and decomposition,
//!   with validation that a pose matrix is DH-compatible at all.
//! - [transforms] — Euler XYZ composition/decomposition and the Cartesian
//!   6-vector (XYZ mm + UVW degrees) used on the protocol wire.
//! - [jacobian] — a finite-difference approximation of the 6xN Jacobian and
//!   its (pseudo-)inverse, converting a desired Cartesian velocity of the end
//!   effector into per-joint velocities.
//! - [arm] — the [arm::RobotArm] controller: a small G-code dialect
//!   (`G0`, `G1`, `M114`, `ik`, `aj`) and the per-tick loop that drives the
//!   end effector towards the target at a commanded linear velocity.
//!
//! One arm is one single-threaded unit of control: commands and ticks for the
//! same arm must be serialized by the host. Independent arms can run on
//! independent threads.
//!
//! # Example
//!
//! ```
//! use rs_marlin_arm::arm::RobotArm;
//! use rs_marlin_arm::joint::{HingeJoint, Motor};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let mut arm = RobotArm::new();
//! for name in ["X", "Y", "Z"] {
//!     let hinge = Rc::new(RefCell::new(HingeJoint::new()));
//!     arm.chain_mut().add_motor(Motor::with_hinge(name, hinge));
//! }
//! arm.add_listener(|response| println!("{}", response));
//! arm.send_command("G0 X10 Y-5");
//! arm.send_command("M114");
//! ```

pub mod kinematic_traits;

pub mod errors;

pub mod utils;

pub mod dh;

pub mod transforms;

pub mod joint;

pub mod chain;

pub mod jacobian;

pub mod arm;
