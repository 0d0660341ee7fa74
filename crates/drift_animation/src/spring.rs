//! Damped spring driver
//!
//! Integrates `a(x, v) = tension * (to - x) - friction * v` with fourth-order
//! Runge-Kutta in fixed 4 ms sub-steps. Velocity is in units per second.
//!
//! A spring started over another driver that exposes a [`MotionState`] picks
//! up its position, velocity, and clock, so re-targeting mid-flight is smooth.

use std::cell::Cell;
use std::rc::Rc;

use drift_core::{Animation, AnimationError, AnimationStart, MotionState, Result};

use crate::composite::Target;
use crate::driver::DriverState;

/// Integration sub-step in milliseconds
const TIMESTEP_MS: f64 = 4.0;

/// Most elapsed time a single frame integrates, so a stalled host does not
/// produce one huge jump
const MAX_FRAME_MS: f64 = 64.0;

/// Tension on the Origami scale `origami(40, 7)` converts to
pub const DEFAULT_TENSION: f64 = 230.2;
pub const DEFAULT_FRICTION: f64 = 22.0;

pub const DEFAULT_BOUNCINESS: f64 = 8.0;
pub const DEFAULT_SPEED: f64 = 12.0;

/// Configuration for a spring animation.
///
/// Stiffness comes either from `tension`/`friction` or from
/// `bounciness`/`speed`. Setting fields from both pairs is an error.
#[derive(Clone, Debug)]
pub struct SpringConfig {
    pub to: Target,
    /// Initial velocity in units per second. Overrides a handed-off velocity.
    pub velocity: Option<f64>,
    pub overshoot_clamping: bool,
    pub rest_displacement_threshold: f64,
    pub rest_speed_threshold: f64,
    pub tension: Option<f64>,
    pub friction: Option<f64>,
    pub bounciness: Option<f64>,
    pub speed: Option<f64>,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            to: Target::Value(0.0),
            velocity: None,
            overshoot_clamping: false,
            rest_displacement_threshold: 0.001,
            rest_speed_threshold: 0.001,
            tension: None,
            friction: None,
            bounciness: None,
            speed: None,
        }
    }
}

impl SpringConfig {
    pub fn new(to: impl Into<Target>) -> Self {
        Self {
            to: to.into(),
            ..Self::default()
        }
    }

    /// Raw stiffness and damping coefficients
    pub fn physical(tension: f64, friction: f64) -> Self {
        Self::default().tension(tension).friction(friction)
    }

    /// Tension and friction given on the Origami design-tool scale
    pub fn origami(tension: f64, friction: f64) -> Self {
        Self::physical(
            tension_from_origami(tension),
            friction_from_origami(friction),
        )
    }

    pub fn to(mut self, to: impl Into<Target>) -> Self {
        self.to = to.into();
        self
    }

    pub fn tension(mut self, tension: f64) -> Self {
        self.tension = Some(tension);
        self
    }

    pub fn friction(mut self, friction: f64) -> Self {
        self.friction = Some(friction);
        self
    }

    pub fn bounciness(mut self, bounciness: f64) -> Self {
        self.bounciness = Some(bounciness);
        self
    }

    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn velocity(mut self, velocity: f64) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn overshoot_clamping(mut self, clamp: bool) -> Self {
        self.overshoot_clamping = clamp;
        self
    }

    pub fn rest_thresholds(mut self, displacement: f64, speed: f64) -> Self {
        self.rest_displacement_threshold = displacement;
        self.rest_speed_threshold = speed;
        self
    }

    /// Resolve to `(tension, friction)` coefficients
    pub fn coefficients(&self) -> Result<(f64, f64)> {
        let physical = self.tension.is_some() || self.friction.is_some();
        let perceptual = self.bounciness.is_some() || self.speed.is_some();

        match (physical, perceptual) {
            (true, true) => Err(AnimationError::InvalidSpringConfig),
            (false, true) => Ok(from_bounciness_and_speed(
                self.bounciness.unwrap_or(DEFAULT_BOUNCINESS),
                self.speed.unwrap_or(DEFAULT_SPEED),
            )),
            _ => Ok((
                self.tension.unwrap_or(DEFAULT_TENSION),
                self.friction.unwrap_or(DEFAULT_FRICTION),
            )),
        }
    }
}

pub fn tension_from_origami(value: f64) -> f64 {
    (value - 30.0) * 3.62 + 194.0
}

pub fn friction_from_origami(value: f64) -> f64 {
    (value - 8.0) * 3.0 + 25.0
}

/// Map perceptual bounciness/speed onto Origami tension/friction and convert.
///
/// The polynomial fits are calibrated constants; changing them changes the
/// feel of every spring configured this way.
pub fn from_bounciness_and_speed(bounciness: f64, speed: f64) -> (f64, f64) {
    fn normalize(value: f64, start: f64, end: f64) -> f64 {
        (value - start) / (end - start)
    }
    fn project_normal(n: f64, start: f64, end: f64) -> f64 {
        start + n * (end - start)
    }
    fn linear(t: f64, start: f64, end: f64) -> f64 {
        t * end + (1.0 - t) * start
    }
    fn quadratic_out(t: f64, start: f64, end: f64) -> f64 {
        linear(2.0 * t - t * t, start, end)
    }
    fn b3_friction1(x: f64) -> f64 {
        0.0007 * x.powi(3) - 0.031 * x.powi(2) + 0.64 * x + 1.28
    }
    fn b3_friction2(x: f64) -> f64 {
        0.000044 * x.powi(3) - 0.006 * x.powi(2) + 0.36 * x + 2.0
    }
    fn b3_friction3(x: f64) -> f64 {
        0.00000045 * x.powi(3) - 0.000332 * x.powi(2) + 0.1078 * x + 5.84
    }
    fn b3_nobounce(tension: f64) -> f64 {
        if tension <= 18.0 {
            b3_friction1(tension)
        } else if tension <= 44.0 {
            b3_friction2(tension)
        } else {
            b3_friction3(tension)
        }
    }

    let b = project_normal(normalize(bounciness / 1.7, 0.0, 20.0), 0.0, 0.8);
    let s = normalize(speed / 1.7, 0.0, 20.0);
    let bouncy_tension = project_normal(s, 0.5, 200.0);
    let bouncy_friction = quadratic_out(b, b3_nobounce(bouncy_tension), 0.01);

    (
        tension_from_origami(bouncy_tension),
        friction_from_origami(bouncy_friction),
    )
}

/// Spring driver towards a fixed target
pub struct SpringAnimation {
    to: f64,
    tension: f64,
    friction: f64,
    initial_velocity: Option<f64>,
    overshoot_clamping: bool,
    rest_displacement_threshold: f64,
    rest_speed_threshold: f64,
    start_position: Cell<f64>,
    motion: Cell<MotionState>,
    driver: DriverState,
}

impl SpringAnimation {
    pub fn new(to: f64, config: &SpringConfig) -> Result<Self> {
        let (tension, friction) = config.coefficients()?;
        Ok(Self {
            to,
            tension,
            friction,
            initial_velocity: config.velocity,
            overshoot_clamping: config.overshoot_clamping,
            rest_displacement_threshold: config.rest_displacement_threshold,
            rest_speed_threshold: config.rest_speed_threshold,
            start_position: Cell::new(0.0),
            motion: Cell::new(MotionState {
                position: 0.0,
                velocity: config.velocity.unwrap_or(0.0),
                time: 0.0,
            }),
            driver: DriverState::default(),
        })
    }

    pub fn tension(&self) -> f64 {
        self.tension
    }

    pub fn friction(&self) -> f64 {
        self.friction
    }

    fn acceleration(&self, position: f64, velocity: f64) -> f64 {
        self.tension * (self.to - position) - self.friction * velocity
    }

    /// One RK4 sub-step
    fn integrate(&self, state: &mut MotionState) {
        let step = TIMESTEP_MS / 1000.0;
        let (x, v) = (state.position, state.velocity);

        let a_v = v;
        let a_a = self.acceleration(x, v);

        let b_v = v + a_a * step / 2.0;
        let b_a = self.acceleration(x + a_v * step / 2.0, b_v);

        let c_v = v + b_a * step / 2.0;
        let c_a = self.acceleration(x + b_v * step / 2.0, c_v);

        let d_v = v + c_a * step;
        let d_a = self.acceleration(x + c_v * step, d_v);

        state.position += (a_v + 2.0 * (b_v + c_v) + d_v) / 6.0 * step;
        state.velocity += (a_a + 2.0 * (b_a + c_a) + d_a) / 6.0 * step;
    }

    fn schedule(self: &Rc<Self>) {
        let this = self.clone();
        self.driver.request_frame(Box::new(move || this.on_frame()));
    }

    fn on_frame(self: Rc<Self>) -> Result<()> {
        self.driver.frame_fired();

        let mut state = self.motion.get();
        let now = self.driver.now().min(state.time + MAX_FRAME_MS);
        let steps = ((now - state.time) / TIMESTEP_MS).floor().max(0.0) as u32;
        for _ in 0..steps {
            self.integrate(&mut state);
        }
        state.time = now;
        self.motion.set(state);

        self.driver.emit(state.position)?;
        if !self.driver.is_active() {
            return Ok(());
        }

        let overshooting = self.overshoot_clamping
            && self.tension != 0.0
            && if self.start_position.get() < self.to {
                state.position > self.to
            } else {
                state.position < self.to
            };

        let resting_speed = state.velocity.abs() <= self.rest_speed_threshold;
        let resting_displacement = self.tension == 0.0
            || (self.to - state.position).abs() <= self.rest_displacement_threshold;

        if overshooting || (resting_speed && resting_displacement) {
            if self.tension != 0.0 {
                self.driver.emit(self.to)?;
            }
            tracing::debug!(position = state.position, "spring at rest");
            self.driver.finish();
            return Ok(());
        }

        self.schedule();
        Ok(())
    }
}

impl Animation for SpringAnimation {
    fn start(self: Rc<Self>, start: AnimationStart) -> Result<()> {
        let (from, previous) = self.driver.begin(start);
        self.start_position.set(from);

        let mut state = MotionState {
            position: from,
            velocity: self.motion.get().velocity,
            time: self.driver.now(),
        };
        if let Some(previous) = previous {
            state = previous;
        }
        if let Some(velocity) = self.initial_velocity {
            state.velocity = velocity;
        }
        self.motion.set(state);

        self.on_frame()
    }

    fn stop(&self) {
        self.driver.cancel();
    }

    fn motion_state(&self) -> Option<MotionState> {
        self.driver.has_started().then(|| self.motion.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_core::{AnimationResult, Graph, ManualScheduler};
    use std::cell::RefCell;

    fn setup() -> (Rc<ManualScheduler>, Graph) {
        let scheduler = Rc::new(ManualScheduler::new());
        let graph = Graph::new(scheduler.clone());
        (scheduler, graph)
    }

    #[test]
    fn test_origami_default() {
        assert!((tension_from_origami(40.0) - DEFAULT_TENSION).abs() < 1e-9);
        assert!((friction_from_origami(7.0) - DEFAULT_FRICTION).abs() < 1e-9);
    }

    #[test]
    fn test_both_parameter_pairs_rejected() {
        let config = SpringConfig::new(1.0).tension(100.0).bounciness(4.0);
        assert_eq!(
            SpringAnimation::new(1.0, &config).err(),
            Some(AnimationError::InvalidSpringConfig)
        );
    }

    #[test]
    fn test_bounciness_defaults_produce_positive_coefficients() {
        let (tension, friction) = SpringConfig::new(1.0).speed(12.0).coefficients().unwrap();
        assert!(tension > 0.0);
        assert!(friction > 0.0);
    }

    #[test]
    fn test_spring_settles_on_target() {
        let (scheduler, graph) = setup();
        let node = graph.value(0.0);
        let results = Rc::new(RefCell::new(Vec::new()));
        let results_clone = results.clone();

        let spring = SpringAnimation::new(100.0, &SpringConfig::new(100.0)).unwrap();
        graph
            .animate(
                node,
                Rc::new(spring),
                Some(Box::new(move |result| results_clone.borrow_mut().push(result))),
            )
            .unwrap();

        scheduler.run_until_idle(16.0, 2000).unwrap();
        assert_eq!(graph.stored_value(node).unwrap(), 100.0);
        assert_eq!(*results.borrow(), vec![AnimationResult::Completed]);
    }

    #[test]
    fn test_zero_tension_rests_on_speed_alone() {
        let (scheduler, graph) = setup();
        let node = graph.value(0.0);
        let results = Rc::new(RefCell::new(Vec::new()));
        let results_clone = results.clone();

        let config = SpringConfig::new(1000.0)
            .tension(0.0)
            .friction(10.0)
            .velocity(5.0);
        graph
            .animate(
                node,
                Rc::new(SpringAnimation::new(1000.0, &config).unwrap()),
                Some(Box::new(move |result| results_clone.borrow_mut().push(result))),
            )
            .unwrap();

        scheduler.run_until_idle(16.0, 2000).unwrap();
        assert_eq!(*results.borrow(), vec![AnimationResult::Completed]);

        // Coasts to velocity / friction and stops far from the target.
        let position = graph.stored_value(node).unwrap();
        assert!((position - 0.5).abs() < 0.01, "stopped at {position}");
    }

    #[test]
    fn test_overshoot_clamping_finishes_at_crossing() {
        let (scheduler, graph) = setup();
        let node = graph.value(0.0);
        let config = SpringConfig::physical(400.0, 5.0)
            .to(10.0)
            .overshoot_clamping(true);

        graph
            .animate(node, Rc::new(SpringAnimation::new(10.0, &config).unwrap()), None)
            .unwrap();
        let frames = scheduler.run_until_idle(16.0, 2000).unwrap();

        assert!(frames < 30);
        assert_eq!(graph.stored_value(node).unwrap(), 10.0);
    }

    #[test]
    fn test_frame_integrates_at_most_64ms() {
        let (scheduler, graph) = setup();
        let node = graph.value(0.0);
        let spring = Rc::new(SpringAnimation::new(100.0, &SpringConfig::new(100.0)).unwrap());
        graph.animate(node, spring.clone(), None).unwrap();

        scheduler.tick(1000.0).unwrap();
        let state = spring.motion_state().unwrap();
        assert_eq!(state.time, 64.0);
    }
}
