//! Exponential decay driver

use std::cell::Cell;
use std::rc::Rc;

use drift_core::{Animation, AnimationError, AnimationStart, Result};

use crate::driver::DriverState;

/// Per-frame change below which a decay is considered settled
const REST_DELTA: f64 = 0.1;

/// Initial velocity of a decay, per component for 2D pairs
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Velocity {
    Scalar(f64),
    Point(f64, f64),
}

impl From<f64> for Velocity {
    fn from(value: f64) -> Self {
        Velocity::Scalar(value)
    }
}

impl From<(f64, f64)> for Velocity {
    fn from((x, y): (f64, f64)) -> Self {
        Velocity::Point(x, y)
    }
}

/// Configuration for a decay animation
#[derive(Clone, Debug)]
pub struct DecayConfig {
    /// Units per millisecond
    pub velocity: Velocity,
    pub deceleration: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            velocity: Velocity::Scalar(0.0),
            deceleration: 0.998,
        }
    }
}

impl DecayConfig {
    pub fn new(velocity: impl Into<Velocity>) -> Self {
        Self {
            velocity: velocity.into(),
            ..Self::default()
        }
    }

    pub fn deceleration(mut self, deceleration: f64) -> Self {
        self.deceleration = deceleration;
        self
    }

    /// Reject decelerations that would never settle
    pub fn validate(&self) -> Result<()> {
        if (0.0..1.0).contains(&self.deceleration) {
            Ok(())
        } else {
            Err(AnimationError::InvalidDecayConfig(self.deceleration))
        }
    }
}

/// Coasts from the start value, slowing exponentially until the per-frame
/// change drops below a tenth of a unit.
pub struct DecayAnimation {
    velocity: f64,
    deceleration: f64,
    from: Cell<f64>,
    last_value: Cell<f64>,
    start_time: Cell<f64>,
    driver: DriverState,
}

impl DecayAnimation {
    pub fn new(velocity: f64, deceleration: f64) -> Result<Self> {
        DecayConfig::new(velocity)
            .deceleration(deceleration)
            .validate()?;
        Ok(Self {
            velocity,
            deceleration,
            from: Cell::new(0.0),
            last_value: Cell::new(0.0),
            start_time: Cell::new(0.0),
            driver: DriverState::default(),
        })
    }

    /// Closed-form position `elapsed` milliseconds after the start
    pub fn position_at(&self, from: f64, elapsed: f64) -> f64 {
        let k = 1.0 - self.deceleration;
        from + (self.velocity / k) * (1.0 - (-k * elapsed).exp())
    }

    fn schedule(self: &Rc<Self>) {
        let this = self.clone();
        self.driver.request_frame(Box::new(move || this.on_frame()));
    }

    fn on_frame(self: Rc<Self>) -> Result<()> {
        self.driver.frame_fired();
        let elapsed = self.driver.now() - self.start_time.get();
        let value = self.position_at(self.from.get(), elapsed);

        self.driver.emit(value)?;

        if (self.last_value.get() - value).abs() < REST_DELTA {
            self.driver.finish();
            return Ok(());
        }

        self.last_value.set(value);
        self.schedule();
        Ok(())
    }
}

impl Animation for DecayAnimation {
    fn start(self: Rc<Self>, start: AnimationStart) -> Result<()> {
        let (from, _) = self.driver.begin(start);
        self.from.set(from);
        self.last_value.set(from);
        self.start_time.set(self.driver.now());
        self.schedule();
        Ok(())
    }

    fn stop(&self) {
        self.driver.cancel();
    }
}
