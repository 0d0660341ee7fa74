//! Composable animations
//!
//! Every combinator returns an [`AnimationHandle`] with the same contract:
//! `start` runs once and reports the outcome through its completion, `stop`
//! is idempotent. Stopping a handle that was never started marks it stopped,
//! and a later `start` completes at once with `Cancelled`.
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use drift_animation::{parallel, sequence, timing, Easing, ParallelConfig, TimingConfig};
//! use drift_core::{Graph, ManualScheduler};
//!
//! let scheduler = Rc::new(ManualScheduler::new());
//! let graph = Graph::new(scheduler.clone());
//! let opacity = graph.value(0.0);
//! let scale = graph.value(0.5);
//!
//! let enter = sequence(vec![
//!     timing(&graph, opacity, TimingConfig::new(1.0).duration(200.0)).unwrap(),
//!     parallel(
//!         vec![timing(&graph, scale, TimingConfig::new(1.0).easing(Easing::EaseOut)).unwrap()],
//!         ParallelConfig::default(),
//!     ),
//! ]);
//! enter.start(None).unwrap();
//!
//! scheduler.run_until_idle(16.0, 100).unwrap();
//! assert_eq!(graph.stored_value(scale).unwrap(), 1.0);
//! ```

use std::cell::Cell;
use std::rc::Rc;

use drift_core::{
    Animation, AnimationError, AnimationFactory, AnimationResult, Completion, CompletionSlot,
    Graph, NodeId, Result,
};

use crate::decay::{DecayAnimation, DecayConfig, Velocity};
use crate::spring::{SpringAnimation, SpringConfig};
use crate::timing::{TimingAnimation, TimingConfig};

/// What a driver animates towards
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Target {
    /// A fixed number
    Value(f64),
    /// A fixed point, for 2D pairs
    Point(f64, f64),
    /// Another node's live value, followed through a tracking binding
    Node(NodeId),
}

impl From<f64> for Target {
    fn from(value: f64) -> Self {
        Target::Value(value)
    }
}

impl From<(f64, f64)> for Target {
    fn from((x, y): (f64, f64)) -> Self {
        Target::Point(x, y)
    }
}

impl From<NodeId> for Target {
    fn from(node: NodeId) -> Self {
        Target::Node(node)
    }
}

/// Start/stop contract shared by every combinator
pub trait CompositeAnimation {
    fn start(self: Rc<Self>, callback: Option<Completion>) -> Result<()>;
    fn stop(&self);
}

/// Shared handle to a composable animation
#[derive(Clone)]
pub struct AnimationHandle(Rc<dyn CompositeAnimation>);

impl AnimationHandle {
    pub fn new(animation: Rc<dyn CompositeAnimation>) -> Self {
        Self(animation)
    }

    /// Start the animation. Fails with `AlreadyStarted` on a second call.
    pub fn start(&self, callback: Option<Completion>) -> Result<()> {
        self.0.clone().start(callback)
    }

    pub fn stop(&self) {
        self.0.stop();
    }
}

/// Start-once / stop-before-start bookkeeping
#[derive(Default)]
struct Lifecycle {
    started: Cell<bool>,
    stopped: Cell<bool>,
    finished: Cell<bool>,
}

impl Lifecycle {
    /// Returns `Ok(false)` when the handle was stopped before it started
    fn begin(&self) -> Result<bool> {
        if self.started.replace(true) {
            return Err(AnimationError::AlreadyStarted);
        }
        Ok(!self.stopped.get())
    }

    /// Whether a stop should reach the running animation
    fn stop(&self) -> bool {
        if !self.started.get() {
            self.stopped.set(true);
            return false;
        }
        !self.finished.get()
    }
}

// ============================================================================
// Leaf animations
// ============================================================================

#[derive(Clone)]
enum DriverSpec {
    Timing(TimingConfig),
    Decay(f64, f64),
    Spring(SpringConfig),
}

impl DriverSpec {
    fn build(&self, to: f64) -> Result<Rc<dyn Animation>> {
        Ok(match self {
            DriverSpec::Timing(config) => Rc::new(TimingAnimation::new(to, config)),
            DriverSpec::Decay(velocity, deceleration) => {
                Rc::new(DecayAnimation::new(*velocity, *deceleration)?)
            }
            DriverSpec::Spring(config) => Rc::new(SpringAnimation::new(to, config)?),
        })
    }
}

/// One driver on one value node
struct NodeAnimation {
    graph: Graph,
    node: NodeId,
    target: Target,
    spec: DriverSpec,
    /// Binding installed for a node target
    tracking: Cell<Option<NodeId>>,
    lifecycle: Rc<Lifecycle>,
}

impl NodeAnimation {
    /// A tracked animation that reached its target keeps following it until stopped
    fn stop_finished_tracking(&self) {
        let Some(tracking) = self.tracking.get() else {
            return;
        };
        if self.graph.active_tracking(self.node).ok().flatten() == Some(tracking) {
            if let Err(err) = self.graph.stop_tracking(self.node) {
                tracing::warn!(error = %err, node = ?self.node, "failed to stop tracking");
            }
        }
    }
}

impl CompositeAnimation for NodeAnimation {
    fn start(self: Rc<Self>, callback: Option<Completion>) -> Result<()> {
        if !self.lifecycle.begin()? {
            if let Some(callback) = callback {
                callback(AnimationResult::Cancelled);
            }
            return Ok(());
        }

        let lifecycle = self.lifecycle.clone();
        let on_end: Completion = Box::new(move |result| {
            lifecycle.finished.set(true);
            if let Some(callback) = callback {
                callback(result);
            }
        });

        match self.target {
            Target::Value(to) => {
                let animation = self.spec.build(to)?;
                self.graph.animate(self.node, animation, Some(on_end))
            }
            Target::Node(target) => {
                let spec = self.spec.clone();
                let factory: AnimationFactory = Rc::new(move |to| spec.build(to));
                let tracking = self
                    .graph
                    .tracking(self.node, target, factory, Some(on_end))?;
                self.tracking.set(Some(tracking));
                self.graph.track(self.node, tracking)
            }
            Target::Point(..) => Err(AnimationError::TypeMismatch {
                expected: "number",
                found: "point".to_string(),
                context: format!("animating value node {:?}", self.node),
            }),
        }
    }

    fn stop(&self) {
        if !self.lifecycle.stop() {
            self.stop_finished_tracking();
            return;
        }
        if let Err(err) = self.graph.stop_animation(self.node) {
            tracing::warn!(error = %err, node = ?self.node, "failed to stop animation");
        }
    }
}

/// Per-component targets when animating a 2D pair
fn split_target(graph: &Graph, target: Target) -> Result<(Target, Target)> {
    match target {
        Target::Point(x, y) => Ok((Target::Value(x), Target::Value(y))),
        Target::Node(node) => {
            let (x, y) = graph.pair_components(node)?;
            Ok((Target::Node(x), Target::Node(y)))
        }
        Target::Value(v) => Err(AnimationError::TypeMismatch {
            expected: "point",
            found: format!("number {v}"),
            context: "animating a pair".to_string(),
        }),
    }
}

fn leaf(graph: &Graph, node: NodeId, target: Target, spec: DriverSpec) -> AnimationHandle {
    AnimationHandle::new(Rc::new(NodeAnimation {
        graph: graph.clone(),
        node,
        target,
        spec,
        tracking: Cell::new(None),
        lifecycle: Rc::default(),
    }))
}

/// Build a leaf, splitting into parallel component animations on a pair
fn node_animation(
    graph: &Graph,
    node: NodeId,
    target: Target,
    component_specs: impl Fn(usize) -> DriverSpec,
) -> Result<AnimationHandle> {
    if let Ok((x, y)) = graph.pair_components(node) {
        let (target_x, target_y) = split_target(graph, target)?;
        return Ok(parallel(
            vec![
                leaf(graph, x, target_x, component_specs(0)),
                leaf(graph, y, target_y, component_specs(1)),
            ],
            ParallelConfig {
                stop_together: false,
            },
        ));
    }

    graph.stored_value(node)?;
    if let Target::Point(..) = target {
        return Err(AnimationError::TypeMismatch {
            expected: "number",
            found: "point".to_string(),
            context: format!("animating value node {node:?}"),
        });
    }
    Ok(leaf(graph, node, target, component_specs(0)))
}

/// Animate `node` along an easing curve
pub fn timing(graph: &Graph, node: NodeId, config: TimingConfig) -> Result<AnimationHandle> {
    let target = config.to;
    node_animation(graph, node, target, |_| DriverSpec::Timing(config.clone()))
}

/// Animate `node` with a spring. Invalid spring parameters fail here.
pub fn spring(graph: &Graph, node: NodeId, config: SpringConfig) -> Result<AnimationHandle> {
    config.coefficients()?;
    let target = config.to;
    node_animation(graph, node, target, |_| DriverSpec::Spring(config.clone()))
}

/// Let `node` coast with decaying velocity
pub fn decay(graph: &Graph, node: NodeId, config: DecayConfig) -> Result<AnimationHandle> {
    config.validate()?;
    let deceleration = config.deceleration;
    let velocity = config.velocity;
    let component = move |index: usize| {
        let v = match velocity {
            Velocity::Scalar(v) => v,
            Velocity::Point(x, _) if index == 0 => x,
            Velocity::Point(_, y) => y,
        };
        DriverSpec::Decay(v, deceleration)
    };
    // Decay has no target; only the shape matters for splitting pairs.
    let target = if graph.pair_components(node).is_ok() {
        Target::Point(0.0, 0.0)
    } else {
        Target::Value(0.0)
    };
    node_animation(graph, node, target, component)
}

// ============================================================================
// Sequence
// ============================================================================

struct Sequence {
    animations: Vec<AnimationHandle>,
    current: Cell<usize>,
    lifecycle: Lifecycle,
    callback: CompletionSlot,
}

impl Sequence {
    fn run(self: &Rc<Self>, index: usize) -> Result<()> {
        self.current.set(index);
        let this = self.clone();
        self.animations[index].start(Some(Box::new(move |result| this.advance(result))))
    }

    fn advance(self: &Rc<Self>, result: AnimationResult) {
        if result == AnimationResult::Cancelled {
            self.finish(AnimationResult::Cancelled);
            return;
        }

        let next = self.current.get() + 1;
        if next >= self.animations.len() {
            self.finish(AnimationResult::Completed);
            return;
        }

        if let Err(err) = self.run(next) {
            tracing::error!(
                error = %err,
                index = next,
                "failed to start next animation in sequence"
            );
            self.finish(AnimationResult::Cancelled);
        }
    }

    fn finish(&self, result: AnimationResult) {
        self.lifecycle.finished.set(true);
        self.callback.fire(result);
    }
}

impl CompositeAnimation for Sequence {
    fn start(self: Rc<Self>, callback: Option<Completion>) -> Result<()> {
        let runnable = self.lifecycle.begin()?;
        if let Some(callback) = callback {
            self.callback.set(callback);
        }
        if !runnable {
            self.finish(AnimationResult::Cancelled);
            return Ok(());
        }
        if self.animations.is_empty() {
            self.finish(AnimationResult::Completed);
            return Ok(());
        }
        self.run(0)
    }

    fn stop(&self) {
        if !self.lifecycle.stop() {
            return;
        }
        if let Some(animation) = self.animations.get(self.current.get()) {
            animation.stop();
        }
    }
}

/// Run animations one after another. A cancelled step aborts the rest.
pub fn sequence(animations: Vec<AnimationHandle>) -> AnimationHandle {
    AnimationHandle::new(Rc::new(Sequence {
        animations,
        current: Cell::new(0),
        lifecycle: Lifecycle::default(),
        callback: CompletionSlot::new(),
    }))
}

// ============================================================================
// Parallel
// ============================================================================

/// Configuration for [`parallel`]
#[derive(Clone, Copy, Debug)]
pub struct ParallelConfig {
    /// Stop every other animation when one is cancelled
    pub stop_together: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            stop_together: true,
        }
    }
}

struct Parallel {
    animations: Vec<AnimationHandle>,
    has_ended: Vec<Cell<bool>>,
    done: Cell<usize>,
    stop_together: bool,
    lifecycle: Lifecycle,
    callback: CompletionSlot,
}

impl Parallel {
    fn child_ended(&self, index: usize, result: AnimationResult) {
        self.has_ended[index].set(true);
        self.done.set(self.done.get() + 1);

        if self.done.get() == self.animations.len() {
            self.lifecycle.finished.set(true);
            self.callback.fire(result);
            return;
        }

        if result == AnimationResult::Cancelled && self.stop_together {
            self.stop_remaining();
        }
    }

    fn stop_remaining(&self) {
        for (animation, ended) in self.animations.iter().zip(&self.has_ended) {
            if !ended.replace(true) {
                animation.stop();
            }
        }
    }
}

impl CompositeAnimation for Parallel {
    fn start(self: Rc<Self>, callback: Option<Completion>) -> Result<()> {
        let runnable = self.lifecycle.begin()?;
        if let Some(callback) = callback {
            self.callback.set(callback);
        }
        if !runnable || self.animations.is_empty() {
            self.lifecycle.finished.set(true);
            self.callback.fire(if runnable {
                AnimationResult::Completed
            } else {
                AnimationResult::Cancelled
            });
            return Ok(());
        }

        for (index, animation) in self.animations.iter().enumerate() {
            let this = self.clone();
            let started = animation.start(Some(Box::new(move |result| {
                this.child_ended(index, result)
            })));
            if let Err(err) = started {
                self.stop_remaining();
                return Err(err);
            }
        }
        Ok(())
    }

    fn stop(&self) {
        if self.lifecycle.stop() {
            self.stop_remaining();
        }
    }
}

/// Run animations at the same time, completing when all have ended.
///
/// The overall result is the result of the last animation to end.
pub fn parallel(animations: Vec<AnimationHandle>, config: ParallelConfig) -> AnimationHandle {
    let has_ended = animations.iter().map(|_| Cell::new(false)).collect();
    AnimationHandle::new(Rc::new(Parallel {
        animations,
        has_ended,
        done: Cell::new(0),
        stop_together: config.stop_together,
        lifecycle: Lifecycle::default(),
        callback: CompletionSlot::new(),
    }))
}

// ============================================================================
// Delay and stagger
// ============================================================================

/// Zero-length timing on a throwaway node that exists only while it runs
struct Delay {
    graph: Graph,
    ms: f64,
    node: Cell<Option<NodeId>>,
    lifecycle: Rc<Lifecycle>,
}

impl Delay {
    fn release(graph: &Graph, node: NodeId) {
        if !graph.contains(node) {
            return;
        }
        if let Err(err) = graph.dispose(node) {
            tracing::error!(error = %err, ?node, "failed to dispose delay node");
        }
    }
}

impl CompositeAnimation for Delay {
    fn start(self: Rc<Self>, callback: Option<Completion>) -> Result<()> {
        if !self.lifecycle.begin()? {
            if let Some(callback) = callback {
                callback(AnimationResult::Cancelled);
            }
            return Ok(());
        }

        let node = self.graph.value(0.0);
        self.node.set(Some(node));

        let lifecycle = self.lifecycle.clone();
        let graph = self.graph.clone();
        let on_end: Completion = Box::new(move |result| {
            lifecycle.finished.set(true);
            // A cancelled delay is released by `stop`, after the node stops animating.
            if result == AnimationResult::Completed {
                Delay::release(&graph, node);
            }
            if let Some(callback) = callback {
                callback(result);
            }
        });

        let config = TimingConfig::new(0.0).duration(0.0).delay(self.ms);
        self.graph
            .animate(node, Rc::new(TimingAnimation::new(0.0, &config)), Some(on_end))
    }

    fn stop(&self) {
        if !self.lifecycle.stop() {
            return;
        }
        let Some(node) = self.node.get() else {
            return;
        };
        if let Err(err) = self.graph.stop_animation(node) {
            tracing::warn!(error = %err, ?node, "failed to stop delay");
        }
        Delay::release(&self.graph, node);
    }
}

/// Complete after `ms` milliseconds without animating anything visible.
///
/// The backing node is allocated on start and freed when the delay ends.
pub fn delay(graph: &Graph, ms: f64) -> AnimationHandle {
    AnimationHandle::new(Rc::new(Delay {
        graph: graph.clone(),
        ms,
        node: Cell::new(None),
        lifecycle: Rc::default(),
    }))
}

/// Start each animation `ms` after the previous one, all running in parallel
pub fn stagger(graph: &Graph, ms: f64, animations: Vec<AnimationHandle>) -> AnimationHandle {
    let staggered = animations
        .into_iter()
        .enumerate()
        .map(|(index, animation)| sequence(vec![delay(graph, ms * index as f64), animation]))
        .collect();
    parallel(staggered, ParallelConfig::default())
}
