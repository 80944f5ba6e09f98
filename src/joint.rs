//! One rotary degree of freedom: the hinge holding the state, and the named
//! motor wiring it into the chain.

use std::cell::RefCell;
use std::rc::Rc;

/// State of one rotary joint: current angle (degrees), angular velocity
/// (degrees per second) and optional travel limits.
///
/// The hinge stores whatever finite angle it is given; range enforcement is
/// the responsibility of the controller call path, which clamps through
/// [HingeJoint::clamped] before committing a commanded angle.
#[derive(Debug, Clone, Default)]
pub struct HingeJoint {
    angle: f64,
    velocity: f64,
    min_angle: Option<f64>,
    max_angle: Option<f64>,
}

impl HingeJoint {
    /// A hinge at angle zero with no travel limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// A hinge at angle zero with the given travel limits in degrees.
    pub fn with_limits(min_angle: f64, max_angle: f64) -> Self {
        Self {
            angle: 0.0,
            velocity: 0.0,
            min_angle: Some(min_angle),
            max_angle: Some(max_angle),
        }
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn set_angle(&mut self, degrees: f64) {
        self.angle = degrees;
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn set_velocity(&mut self, degrees_per_second: f64) {
        self.velocity = degrees_per_second;
    }

    /// The given angle clamped into the hinge's travel range. Unlimited
    /// directions pass the value through.
    pub fn clamped(&self, degrees: f64) -> f64 {
        let low = self.min_angle.map_or(degrees, |min| degrees.max(min));
        self.max_angle.map_or(low, |max| low.min(max))
    }

    /// Advances the angle by the current velocity over `dt` seconds.
    pub fn update(&mut self, dt: f64) {
        self.angle += self.velocity * dt;
    }
}

/// Shared handle to a hinge. The same hinge is referenced by the chain and
/// by the host's rigid body simulation; one arm is one single-threaded
/// actor, so no locking is involved.
pub type HingeRef = Rc<RefCell<HingeJoint>>;

/// A named motor driving one hinge. The name is the axis letter the G-code
/// dialect addresses the joint by ("X", "Y", "Z", "U", "V", "W").
///
/// A motor without a hinge is a valid placeholder: every computation skips
/// it rather than treating it as a joint at angle zero.
#[derive(Clone)]
pub struct Motor {
    name: String,
    hinge: Option<HingeRef>,
}

impl Motor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hinge: None,
        }
    }

    pub fn with_hinge(name: impl Into<String>, hinge: HingeRef) -> Self {
        Self {
            name: name.into(),
            hinge: Some(hinge),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_hinge(&self) -> bool {
        self.hinge.is_some()
    }

    pub fn hinge(&self) -> Option<&HingeRef> {
        self.hinge.as_ref()
    }

    pub fn set_hinge(&mut self, hinge: Option<HingeRef>) {
        self.hinge = hinge;
    }
}
