//! Time-based easing driver

use std::cell::Cell;
use std::rc::Rc;

use drift_core::{Animation, AnimationStart, Result};

use crate::composite::Target;
use crate::driver::DriverState;
use crate::easing::Easing;

/// Configuration for a timing animation
#[derive(Clone, Debug)]
pub struct TimingConfig {
    pub to: Target,
    pub easing: Easing,
    /// Duration in milliseconds
    pub duration: f64,
    /// Start delay in milliseconds
    pub delay: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            to: Target::Value(0.0),
            easing: Easing::EaseInOut,
            duration: 500.0,
            delay: 0.0,
        }
    }
}

impl TimingConfig {
    pub fn new(to: impl Into<Target>) -> Self {
        Self {
            to: to.into(),
            ..Self::default()
        }
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn duration(mut self, ms: f64) -> Self {
        self.duration = ms;
        self
    }

    pub fn delay(mut self, ms: f64) -> Self {
        self.delay = ms;
        self
    }
}

/// Eases from the start value to `to` over a fixed duration
pub struct TimingAnimation {
    to: f64,
    easing: Easing,
    duration: f64,
    delay: f64,
    from: Cell<f64>,
    start_time: Cell<f64>,
    driver: DriverState,
}

impl TimingAnimation {
    pub fn new(to: f64, config: &TimingConfig) -> Self {
        Self {
            to,
            easing: config.easing,
            duration: config.duration.max(0.0),
            delay: config.delay.max(0.0),
            from: Cell::new(0.0),
            start_time: Cell::new(0.0),
            driver: DriverState::default(),
        }
    }

    fn begin(self: Rc<Self>) -> Result<()> {
        self.driver.timer_fired();
        if !self.driver.is_active() {
            return Ok(());
        }

        if self.duration == 0.0 {
            self.driver.emit(self.to)?;
            self.driver.finish();
            return Ok(());
        }

        self.start_time.set(self.driver.now());
        self.schedule();
        Ok(())
    }

    fn schedule(self: &Rc<Self>) {
        let this = self.clone();
        self.driver.request_frame(Box::new(move || this.on_frame()));
    }

    fn on_frame(self: Rc<Self>) -> Result<()> {
        self.driver.frame_fired();
        let now = self.driver.now();
        let from = self.from.get();
        let elapsed = now - self.start_time.get();

        if elapsed >= self.duration {
            self.driver
                .emit(from + self.easing.apply(1.0) * (self.to - from))?;
            self.driver.finish();
            return Ok(());
        }

        let progress = elapsed / self.duration;
        let value = from + self.easing.apply(progress) * (self.to - from);
        tracing::trace!(progress, value, "timing frame");
        self.driver.emit(value)?;
        self.schedule();
        Ok(())
    }
}

impl Animation for TimingAnimation {
    fn start(self: Rc<Self>, start: AnimationStart) -> Result<()> {
        let (from, _) = self.driver.begin(start);
        self.from.set(from);

        if self.delay > 0.0 {
            let this = self.clone();
            self.driver
                .set_timeout(Box::new(move || this.begin()), self.delay);
            Ok(())
        } else {
            self.begin()
        }
    }

    fn stop(&self) {
        self.driver.cancel();
    }
}
