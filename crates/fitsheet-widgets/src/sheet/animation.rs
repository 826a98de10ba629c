#![forbid(unsafe_code)]

//! Spring-driven values for the sheet's offset and dim layer.
//!
//! [`SpringCurve`] describes a critically-tunable spring by its response
//! (period of the undamped oscillation, in seconds) and damping fraction,
//! the same two knobs the host platform's interactive spring exposes. It is
//! solved in closed form, so sampling at any time is exact and independent
//! of frame rate.
//!
//! [`AnimatedValue`] is a value moving toward a target along a curve,
//! parameterized by loop time. Retargeting mid-flight keeps the current
//! position and velocity, so interrupted animations stay continuous.
//!
//! # Invariants
//!
//! 1. `AnimatedValue::value_at(t)` is continuous across `animate_to`.
//! 2. Once `is_settled(t)` is true, `value_at(t)` equals the target exactly.
//! 3. Every animation settles within `MAX_ANIMATION` of its last retarget.

use std::f64::consts::PI;
use std::time::Duration;

/// Position error below which an animation counts as settled.
pub const POSITION_EPSILON: f32 = 0.1;
/// Velocity (units per second) below which an animation counts as settled.
pub const VELOCITY_EPSILON: f32 = 5.0;
/// Hard cap on animation length regardless of curve.
pub const MAX_ANIMATION: Duration = Duration::from_secs(3);
/// Delay used by [`DismissTiming::FixedDelay`] in its legacy form.
pub const LEGACY_DISMISS_DELAY: Duration = Duration::from_millis(150);

// ---------------------------------------------------------------------------
// SpringCurve
// ---------------------------------------------------------------------------

/// Damped spring parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringCurve {
    /// Undamped period in seconds.
    pub response: f32,
    /// `1.0` is critically damped, below oscillates, above creeps.
    pub damping_fraction: f32,
}

impl Default for SpringCurve {
    fn default() -> Self {
        Self::INTERACTIVE
    }
}

impl SpringCurve {
    /// Curve used for show, hide, and drag release.
    pub const INTERACTIVE: Self = Self {
        response: 0.35,
        damping_fraction: 0.78,
    };

    /// Create a curve. Non-positive or non-finite inputs fall back to
    /// [`SpringCurve::INTERACTIVE`] values.
    #[must_use]
    pub fn new(response: f32, damping_fraction: f32) -> Self {
        let response = if response.is_finite() && response > 0.0 {
            response
        } else {
            Self::INTERACTIVE.response
        };
        let damping_fraction = if damping_fraction.is_finite() && damping_fraction > 0.0 {
            damping_fraction
        } else {
            Self::INTERACTIVE.damping_fraction
        };
        Self {
            response,
            damping_fraction,
        }
    }

    fn omega(&self) -> f64 {
        2.0 * PI / f64::from(self.response.max(1e-3))
    }

    /// Spring constant for a unit mass.
    #[must_use]
    pub fn stiffness(&self) -> f32 {
        self.omega().powi(2) as f32
    }

    /// Damping coefficient for a unit mass.
    #[must_use]
    pub fn damping(&self) -> f32 {
        (4.0 * PI * f64::from(self.damping_fraction) / f64::from(self.response.max(1e-3))) as f32
    }

    /// Displacement and velocity after `elapsed`, starting from
    /// `displacement` (distance from the target) and `velocity`.
    #[must_use]
    pub fn sample(&self, displacement: f32, velocity: f32, elapsed: Duration) -> (f32, f32) {
        let t = elapsed.as_secs_f64();
        let d0 = f64::from(displacement);
        let v0 = f64::from(velocity);
        let w0 = self.omega();
        let zeta = f64::from(self.damping_fraction.max(0.0));

        let (d, v) = if (zeta - 1.0).abs() < 1e-6 {
            let b = v0 + w0 * d0;
            let decay = (-w0 * t).exp();
            let d = decay * (d0 + b * t);
            let v = decay * (b - w0 * (d0 + b * t));
            (d, v)
        } else if zeta < 1.0 {
            let a = zeta * w0;
            let wd = w0 * (1.0 - zeta * zeta).sqrt();
            let b = (v0 + a * d0) / wd;
            let decay = (-a * t).exp();
            let (sin, cos) = (wd * t).sin_cos();
            let d = decay * (d0 * cos + b * sin);
            let v = decay * ((b * wd - a * d0) * cos - (a * b + d0 * wd) * sin);
            (d, v)
        } else {
            let root = (zeta * zeta - 1.0).sqrt();
            let r1 = -w0 * (zeta - root);
            let r2 = -w0 * (zeta + root);
            let c2 = (v0 - r1 * d0) / (r2 - r1);
            let c1 = d0 - c2;
            let (e1, e2) = ((r1 * t).exp(), (r2 * t).exp());
            (c1 * e1 + c2 * e2, c1 * r1 * e1 + c2 * r2 * e2)
        };
        (d as f32, v as f32)
    }
}

// ---------------------------------------------------------------------------
// DismissTiming
// ---------------------------------------------------------------------------

/// What releases the external "is shown" flag after a dismissal starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DismissTiming {
    /// Tear down once the exit animation has settled.
    #[default]
    AnimationSettled,
    /// Tear down after a fixed delay, regardless of the animation.
    FixedDelay(Duration),
}

impl DismissTiming {
    /// The 150ms timer used by older hosts.
    #[must_use]
    pub const fn legacy() -> Self {
        Self::FixedDelay(LEGACY_DISMISS_DELAY)
    }
}

// ---------------------------------------------------------------------------
// AnimatedValue
// ---------------------------------------------------------------------------

/// A scalar animated along a [`SpringCurve`] in loop time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimatedValue {
    curve: SpringCurve,
    target: f32,
    /// Loop time of the last retarget.
    start: Duration,
    displacement: f32,
    velocity: f32,
}

impl AnimatedValue {
    /// A value resting at `value`.
    #[must_use]
    pub fn new(value: f32, curve: SpringCurve) -> Self {
        Self {
            curve,
            target: value,
            start: Duration::ZERO,
            displacement: 0.0,
            velocity: 0.0,
        }
    }

    #[must_use]
    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn set_curve(&mut self, curve: SpringCurve) {
        self.curve = curve;
    }

    fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.start)
    }

    fn raw(&self, now: Duration) -> (f32, f32) {
        if self.displacement == 0.0 && self.velocity == 0.0 {
            return (0.0, 0.0);
        }
        self.curve
            .sample(self.displacement, self.velocity, self.elapsed(now))
    }

    /// Whether the value has come to rest at its target.
    #[must_use]
    pub fn is_settled(&self, now: Duration) -> bool {
        if self.elapsed(now) >= MAX_ANIMATION {
            return true;
        }
        let (d, v) = self.raw(now);
        d.abs() < POSITION_EPSILON && v.abs() < VELOCITY_EPSILON
    }

    /// Current value.
    #[must_use]
    pub fn value_at(&self, now: Duration) -> f32 {
        if self.is_settled(now) {
            self.target
        } else {
            self.target + self.raw(now).0
        }
    }

    /// Current velocity (units per second).
    #[must_use]
    pub fn velocity_at(&self, now: Duration) -> f32 {
        if self.is_settled(now) {
            0.0
        } else {
            self.raw(now).1
        }
    }

    /// Start moving toward `target` from wherever the value is at `now`.
    pub fn animate_to(&mut self, target: f32, now: Duration) {
        if !target.is_finite() {
            return;
        }
        let value = self.value_at(now);
        let velocity = self.velocity_at(now);
        self.target = target;
        self.start = now;
        self.displacement = value - target;
        self.velocity = velocity;
    }

    /// Jump to `value` and stop.
    pub fn snap_to(&mut self, value: f32, now: Duration) {
        if !value.is_finite() {
            return;
        }
        self.target = value;
        self.start = now;
        self.displacement = 0.0;
        self.velocity = 0.0;
    }

    /// Collapse a settled animation onto its target.
    ///
    /// Returns `true` if the value is at rest.
    pub fn settle(&mut self, now: Duration) -> bool {
        if self.is_settled(now) {
            let target = self.target;
            self.snap_to(target, now);
            true
        } else {
            false
        }
    }
}
