//! Integration tests for drivers and combinators on a live graph
//!
//! These tests verify that:
//! - Drivers write through the graph and commit props once per frame
//! - Springs re-targeted mid-flight keep their velocity
//! - Sequence and parallel report exactly one outcome and stop children once
//! - Node targets keep following the target until stopped
//! - Event payloads land in value nodes and reject mismatched shapes

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use drift_animation::{
    interpolate, parallel, sequence, spring, timing, AnimationHandle, CompositeAnimation, Easing,
    EventConfig, EventMapper, EventMapping, InterpolationConfig, ParallelConfig, SpringConfig,
    TimingConfig,
};
use drift_core::{
    AnimationError, AnimationResult, Completion, CompletionSlot, Graph, ManualScheduler,
    NodeValue, Prop, Result, TransformEntry,
};
use indexmap::IndexMap;
use serde_json::json;

fn setup() -> (Rc<ManualScheduler>, Graph) {
    let scheduler = Rc::new(ManualScheduler::new());
    let graph = Graph::new(scheduler.clone());
    (scheduler, graph)
}

fn recorder() -> (Rc<RefCell<Vec<AnimationResult>>>, Completion) {
    let results = Rc::new(RefCell::new(Vec::new()));
    let results_clone = results.clone();
    (
        results,
        Box::new(move |result: AnimationResult| results_clone.borrow_mut().push(result)),
    )
}

/// Composite that only records calls; the test decides when it ends
#[derive(Default)]
struct Scripted {
    starts: Cell<u32>,
    stops: Cell<u32>,
    end: CompletionSlot,
}

impl Scripted {
    fn handle(self: &Rc<Self>) -> AnimationHandle {
        AnimationHandle::new(self.clone())
    }
}

impl CompositeAnimation for Scripted {
    fn start(self: Rc<Self>, callback: Option<Completion>) -> Result<()> {
        self.starts.set(self.starts.get() + 1);
        if let Some(callback) = callback {
            self.end.set(callback);
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.set(self.stops.get() + 1);
        self.end.fire(AnimationResult::Cancelled);
    }
}

/// Linear timing hits the midpoint at half duration and completes once
#[test]
fn test_timing_drives_props_each_frame() {
    let (scheduler, graph) = setup();
    let left = graph.value(0.0);
    let commits = Rc::new(Cell::new(0));
    let commits_clone = commits.clone();

    let mut style = IndexMap::new();
    style.insert("left".to_string(), Prop::Node(left));
    graph
        .props(style, Rc::new(move || commits_clone.set(commits_clone.get() + 1)))
        .unwrap();

    let (results, done) = recorder();
    timing(
        &graph,
        left,
        TimingConfig::new(100.0)
            .duration(100.0)
            .easing(Easing::Linear),
    )
    .unwrap()
    .start(Some(done))
    .unwrap();

    scheduler.tick(50.0).unwrap();
    assert_eq!(graph.stored_value(left).unwrap(), 50.0);
    let commits_at_half = commits.get();

    scheduler.tick(50.0).unwrap();
    assert_eq!(graph.stored_value(left).unwrap(), 100.0);
    assert_eq!(commits.get(), commits_at_half + 1);
    assert_eq!(*results.borrow(), vec![AnimationResult::Completed]);

    scheduler.run_until_idle(16.0, 10).unwrap();
    assert_eq!(results.borrow().len(), 1);
}

/// A spring started mid-flight inherits the running spring's velocity
#[test]
fn test_spring_handoff_keeps_velocity() {
    let (scheduler, graph) = setup();
    let moving = graph.value(0.0);

    spring(&graph, moving, SpringConfig::new(100.0))
        .unwrap()
        .start(None)
        .unwrap();
    for _ in 0..3 {
        scheduler.tick(16.0).unwrap();
    }
    let position = graph.stored_value(moving).unwrap();
    assert!(position > 0.0 && position < 100.0, "mid-flight at {position}");

    assert!(graph.is_animating(moving).unwrap());

    let resting = graph.value(position);
    spring(&graph, moving, SpringConfig::new(0.0))
        .unwrap()
        .start(None)
        .unwrap();
    spring(&graph, resting, SpringConfig::new(0.0))
        .unwrap()
        .start(None)
        .unwrap();

    // No jump at the hand-off itself.
    assert_eq!(graph.stored_value(moving).unwrap(), position);

    scheduler.tick(16.0).unwrap();
    assert!(
        graph.stored_value(moving).unwrap() > position,
        "inherited velocity should carry it further"
    );
    assert!(graph.stored_value(resting).unwrap() < position);

    scheduler.run_until_idle(16.0, 500).unwrap();
    assert_eq!(graph.stored_value(moving).unwrap(), 0.0);
    assert_eq!(graph.stored_value(resting).unwrap(), 0.0);
}

/// A tension-free spring coasts to a stop instead of running forever
#[test]
fn test_spring_without_tension_terminates() {
    let (scheduler, graph) = setup();
    let node = graph.value(0.0);
    let (results, done) = recorder();

    spring(
        &graph,
        node,
        SpringConfig::physical(0.0, 2.0).to(1.0).velocity(1.0),
    )
    .unwrap()
    .start(Some(done))
    .unwrap();

    scheduler.run_until_idle(16.0, 2000).unwrap();
    assert!(!scheduler.has_pending());
    assert_eq!(*results.borrow(), vec![AnimationResult::Completed]);
    assert!((graph.stored_value(node).unwrap() - 0.5).abs() < 0.01);
}

/// Cancelling the first step ends the sequence and never starts the second
#[test]
fn test_sequence_abort_skips_remaining() {
    let (scheduler, graph) = setup();
    let a = graph.value(0.0);
    let b = graph.value(0.0);
    let (results, done) = recorder();

    sequence(vec![
        timing(&graph, a, TimingConfig::new(1.0).duration(100.0)).unwrap(),
        timing(&graph, b, TimingConfig::new(1.0).duration(100.0)).unwrap(),
    ])
    .start(Some(done))
    .unwrap();

    scheduler.tick(16.0).unwrap();
    graph.set_value(a, 0.5).unwrap();
    scheduler.run_until_idle(16.0, 50).unwrap();

    assert_eq!(*results.borrow(), vec![AnimationResult::Cancelled]);
    assert_eq!(graph.stored_value(b).unwrap(), 0.0);
    assert!(!graph.is_animating(b).unwrap());
}

/// One cancelled child stops each sibling exactly once
#[test]
fn test_parallel_stops_siblings_once() {
    let scripted: Vec<Rc<Scripted>> = (0..3).map(|_| Rc::new(Scripted::default())).collect();
    let (results, done) = recorder();

    let handle = parallel(
        scripted.iter().map(Scripted::handle).collect(),
        ParallelConfig::default(),
    );
    handle.start(Some(done)).unwrap();
    assert!(scripted.iter().all(|step| step.starts.get() == 1));

    scripted[0].end.fire(AnimationResult::Cancelled);

    assert_eq!(scripted[0].stops.get(), 0);
    assert_eq!(scripted[1].stops.get(), 1);
    assert_eq!(scripted[2].stops.get(), 1);
    assert_eq!(*results.borrow(), vec![AnimationResult::Cancelled]);

    handle.stop();
    assert_eq!(scripted[1].stops.get(), 1);
    assert_eq!(results.borrow().len(), 1);
}

/// Without `stop_together` the siblings run on and the group waits for them
#[test]
fn test_parallel_without_stop_together() {
    let scripted: Vec<Rc<Scripted>> = (0..2).map(|_| Rc::new(Scripted::default())).collect();
    let (results, done) = recorder();

    parallel(
        scripted.iter().map(Scripted::handle).collect(),
        ParallelConfig {
            stop_together: false,
        },
    )
    .start(Some(done))
    .unwrap();

    scripted[0].end.fire(AnimationResult::Cancelled);
    assert_eq!(scripted[1].stops.get(), 0);
    assert!(results.borrow().is_empty());

    scripted[1].end.fire(AnimationResult::Completed);
    assert_eq!(results.borrow().len(), 1);
}

/// A node target follows its target across changes until the handle stops
#[test]
fn test_node_target_follows_until_stopped() {
    let (scheduler, graph) = setup();
    let leader = graph.value(0.0);
    let follower = graph.value(0.0);
    let (results, done) = recorder();

    let handle = timing(
        &graph,
        follower,
        TimingConfig::new(leader).duration(100.0),
    )
    .unwrap();
    handle.start(Some(done)).unwrap();

    graph.set_value(leader, 50.0).unwrap();
    scheduler.run_until_idle(16.0, 50).unwrap();
    assert_eq!(graph.stored_value(follower).unwrap(), 50.0);
    assert_eq!(*results.borrow(), vec![AnimationResult::Completed]);

    graph.set_value(leader, 80.0).unwrap();
    scheduler.run_until_idle(16.0, 50).unwrap();
    assert_eq!(graph.stored_value(follower).unwrap(), 80.0);

    handle.stop();
    graph.set_value(leader, 10.0).unwrap();
    scheduler.run_until_idle(16.0, 50).unwrap();
    assert_eq!(graph.stored_value(follower).unwrap(), 80.0);
    assert_eq!(results.borrow().len(), 1);
}

/// An interpolated transform re-renders as its source animates
#[test]
fn test_interpolated_transform_in_props() {
    let (scheduler, graph) = setup();
    let progress = graph.value(0.0);
    let rotation = interpolate(
        &graph,
        progress,
        &InterpolationConfig::strings(vec![0.0, 1.0], vec!["0deg", "360deg"]),
    )
    .unwrap();

    let rendered = Rc::new(RefCell::new(Vec::new()));
    let rendered_clone = rendered.clone();
    let reader = graph.clone();
    let mut entries = IndexMap::new();
    entries.insert(
        "transform".to_string(),
        Prop::Transform(vec![TransformEntry::node("rotate", rotation)]),
    );
    entries.insert("opacity".to_string(), Prop::from(1.0));
    graph
        .props(
            entries,
            Rc::new(move || {
                let value = reader.get_value(rotation).unwrap();
                rendered_clone.borrow_mut().push(value);
            }),
        )
        .unwrap();

    timing(
        &graph,
        progress,
        TimingConfig::new(1.0)
            .duration(100.0)
            .easing(Easing::Linear),
    )
    .unwrap()
    .start(None)
    .unwrap();
    scheduler.tick(50.0).unwrap();
    scheduler.tick(50.0).unwrap();

    let rendered = rendered.borrow();
    assert_eq!(rendered.first(), Some(&NodeValue::from("180deg")));
    assert_eq!(rendered.last(), Some(&NodeValue::from("360deg")));
}

/// Numbers land in their nodes; other shapes are rejected
#[test]
fn test_event_mapping_into_nodes() {
    let (_scheduler, graph) = setup();
    let x = graph.value(0.0);
    let heard = Rc::new(Cell::new(0));
    let heard_clone = heard.clone();

    let offset = EventMapping::object([("x", EventMapping::Node(x))]);
    let native = EventMapping::object([("contentOffset", offset)]);
    let mapper = EventMapper::new(
        &graph,
        vec![EventMapping::object([("nativeEvent", native)])],
        EventConfig::default().listener(move |_| heard_clone.set(heard_clone.get() + 1)),
    );

    mapper
        .handle(&[json!({ "nativeEvent": { "contentOffset": { "x": 42 } } })])
        .unwrap();
    assert_eq!(graph.stored_value(x).unwrap(), 42.0);
    assert_eq!(heard.get(), 1);

    let rejected =
        mapper.handle(&[json!({ "nativeEvent": { "contentOffset": { "x": "bad" } } })]);
    assert!(matches!(rejected, Err(AnimationError::TypeMismatch { .. })));
    assert_eq!(graph.stored_value(x).unwrap(), 42.0);
    assert_eq!(heard.get(), 1);
}
