//! Animated node graph
//!
//! Nodes live in a slotmap arena owned by [`Graph`] and refer to each other by
//! [`NodeId`]. A node's children are the nodes that read from it, so edges point
//! from a value towards the props node that finally consumes it.
//!
//! # Update protocol
//!
//! When a value node's stored value changes, the graph flushes in two phases:
//!
//! 1. Walk children from the changed node and collect every terminal node
//!    (props and tracking nodes) into a deduplicated set. Non-terminal nodes are
//!    expanded into their own children instead.
//! 2. Call `update` once on each collected terminal. Props nodes invoke their
//!    commit callback, which reads the whole value tree on demand.
//!
//! # Attach counting
//!
//! A node attaches exactly when its child count goes from 0 to 1 and detaches
//! when it returns to 0. Attaching registers the node as a child of every node
//! it reads from; detaching undoes exactly that.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::animation::{Animation, AnimationResult, AnimationStart, Completion, UpdateFn};
use crate::error::{AnimationError, Result};
use crate::listener::{Listener, ListenerEntry, ListenerId, ListenerRegistry};
use crate::scheduler::Scheduler;
use crate::value::NodeValue;

new_key_type! {
    pub struct NodeId;
}

/// Pure mapping from a numeric input to an output value
pub type Mapping = Rc<dyn Fn(f64) -> NodeValue>;

/// Commit callback of a props node, invoked once per flush that reaches it
pub type CommitFn = Rc<dyn Fn()>;

/// Builds a fresh driver aimed at the given target value
pub type AnimationFactory = Rc<dyn Fn(f64) -> Result<Rc<dyn Animation>>>;

/// Input entry for style and props maps
#[derive(Clone, Debug)]
pub enum Prop {
    /// A plain value copied through unchanged
    Static(NodeValue),
    /// A dependency whose value is read on every flush
    Node(NodeId),
    /// A nested map, built into its own style node
    Map(IndexMap<String, Prop>),
    /// A transform list, built into a transform node
    Transform(Vec<TransformEntry>),
}

impl From<NodeId> for Prop {
    fn from(id: NodeId) -> Self {
        Prop::Node(id)
    }
}

impl From<f64> for Prop {
    fn from(value: f64) -> Self {
        Prop::Static(NodeValue::Number(value))
    }
}

impl From<&str> for Prop {
    fn from(value: &str) -> Self {
        Prop::Static(NodeValue::from(value))
    }
}

/// One `name(args)` entry of a transform list
#[derive(Clone, Debug)]
pub struct TransformEntry {
    pub name: String,
    pub arg: TransformArg,
}

impl TransformEntry {
    pub fn node(name: impl Into<String>, node: NodeId) -> Self {
        Self {
            name: name.into(),
            arg: TransformArg::Node(node),
        }
    }

    pub fn fixed(name: impl Into<String>, args: Vec<NodeValue>) -> Self {
        Self {
            name: name.into(),
            arg: TransformArg::Static(args),
        }
    }
}

#[derive(Clone, Debug)]
pub enum TransformArg {
    Static(Vec<NodeValue>),
    Node(NodeId),
}

#[derive(Clone)]
enum Slot {
    Static(NodeValue),
    Node(NodeId),
}

struct ActiveAnimation {
    animation: Rc<dyn Animation>,
    generation: u64,
}

struct ValueNode {
    value: f64,
    offset: f64,
    animation: Option<ActiveAnimation>,
    tracking: Option<NodeId>,
    listeners: ListenerRegistry,
}

struct InterpolationNode {
    parent: NodeId,
    mapping: Mapping,
    listeners: ListenerRegistry,
    parent_listener: Option<ListenerId>,
}

struct PairNode {
    x: NodeId,
    y: NodeId,
    next_listener: u64,
    joint: IndexMap<ListenerId, (ListenerId, ListenerId)>,
}

struct PropsNode {
    entries: IndexMap<String, Slot>,
    commit: CommitFn,
    attached: bool,
}

struct TrackingNode {
    value: NodeId,
    parent: NodeId,
    factory: AnimationFactory,
    callback: Rc<RefCell<Option<Completion>>>,
    retargeting: Rc<Cell<bool>>,
    attached: bool,
}

enum NodeKind {
    Value(ValueNode),
    Interpolation(InterpolationNode),
    Pair(PairNode),
    Transform(Vec<TransformEntry>),
    Style(IndexMap<String, Slot>),
    Props(PropsNode),
    Tracking(TrackingNode),
}

impl NodeKind {
    fn name(&self) -> &'static str {
        match self {
            NodeKind::Value(_) => "value",
            NodeKind::Interpolation(_) => "interpolation",
            NodeKind::Pair(_) => "pair",
            NodeKind::Transform(_) => "transform",
            NodeKind::Style(_) => "style",
            NodeKind::Props(_) => "props",
            NodeKind::Tracking(_) => "tracking",
        }
    }

    /// Terminal nodes expose `update` and end the discovery walk
    fn is_terminal(&self) -> bool {
        matches!(self, NodeKind::Props(_) | NodeKind::Tracking(_))
    }

    fn accepts_children(&self) -> bool {
        !self.is_terminal()
    }
}

struct NodeEntry {
    kind: NodeKind,
    children: SmallVec<[NodeId; 4]>,
}

impl NodeEntry {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: SmallVec::new(),
        }
    }
}

/// What a read needs, copied out so no borrow is held while recursing
enum ReadSource {
    Interpolation(NodeId, Mapping),
    Pair(NodeId, NodeId),
    Transform(Vec<TransformEntry>),
    Map(IndexMap<String, Slot>),
    Forward(NodeId),
}

struct GraphInner {
    nodes: RefCell<SlotMap<NodeId, NodeEntry>>,
    scheduler: Rc<dyn Scheduler>,
    next_generation: Cell<u64>,
}

/// Shared handle to an animated node graph.
///
/// Cloning is cheap; all clones refer to the same arena. The graph is
/// single-threaded: drivers and callbacks run on the scheduler's timeline.
#[derive(Clone)]
pub struct Graph {
    inner: Rc<GraphInner>,
}

#[derive(Clone)]
struct WeakGraph(Weak<GraphInner>);

impl WeakGraph {
    fn upgrade(&self) -> Option<Graph> {
        self.0.upgrade().map(|inner| Graph { inner })
    }
}

impl Graph {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            inner: Rc::new(GraphInner {
                nodes: RefCell::new(SlotMap::with_key()),
                scheduler,
                next_generation: Cell::new(0),
            }),
        }
    }

    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.inner.scheduler.clone()
    }

    /// Number of live nodes in the arena
    pub fn len(&self) -> usize {
        self.inner.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.nodes.borrow().contains_key(id)
    }

    fn downgrade(&self) -> WeakGraph {
        WeakGraph(Rc::downgrade(&self.inner))
    }

    fn insert(&self, kind: NodeKind) -> NodeId {
        let id = self.inner.nodes.borrow_mut().insert(NodeEntry::new(kind));
        tracing::trace!(?id, "node created");
        id
    }

    fn ensure(&self, id: NodeId) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(AnimationError::UnknownNode(id))
        }
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Create a value node holding `initial`
    pub fn value(&self, initial: f64) -> NodeId {
        self.insert(NodeKind::Value(ValueNode {
            value: initial,
            offset: 0.0,
            animation: None,
            tracking: None,
            listeners: ListenerRegistry::default(),
        }))
    }

    /// Create a 2D pair backed by two new value nodes
    pub fn value_xy(&self, x: f64, y: f64) -> NodeId {
        let x = self.value(x);
        let y = self.value(y);
        self.insert(NodeKind::Pair(PairNode {
            x,
            y,
            next_listener: 0,
            joint: IndexMap::new(),
        }))
    }

    /// Create an interpolation node reading from `parent` through `mapping`
    pub fn interpolation(&self, parent: NodeId, mapping: Mapping) -> Result<NodeId> {
        self.ensure(parent)?;
        Ok(self.insert(NodeKind::Interpolation(InterpolationNode {
            parent,
            mapping,
            listeners: ListenerRegistry::default(),
            parent_listener: None,
        })))
    }

    /// Create a transform list node
    pub fn transform(&self, entries: Vec<TransformEntry>) -> Result<NodeId> {
        for entry in &entries {
            if let TransformArg::Node(node) = entry.arg {
                self.ensure(node)?;
            }
        }
        Ok(self.insert(NodeKind::Transform(entries)))
    }

    /// Create a style map node. Nested maps and transform lists become nodes.
    pub fn style(&self, entries: IndexMap<String, Prop>) -> Result<NodeId> {
        let slots = self.build_slots(entries)?;
        Ok(self.insert(NodeKind::Style(slots)))
    }

    /// Create a props node and attach it to its dependencies.
    ///
    /// `commit` runs once per flush that reaches this node, and never after
    /// the node is detached.
    pub fn props(&self, entries: IndexMap<String, Prop>, commit: CommitFn) -> Result<NodeId> {
        let slots = self.build_slots(entries)?;
        let id = self.insert(NodeKind::Props(PropsNode {
            entries: slots,
            commit,
            attached: false,
        }));
        self.attach(id)?;
        Ok(id)
    }

    /// Create a tracking node that re-targets `value` at `parent` on every flush.
    ///
    /// `callback` receives the end of the tracked animation. Runs superseded by
    /// a retarget are not reported.
    pub fn tracking(
        &self,
        value: NodeId,
        parent: NodeId,
        factory: AnimationFactory,
        callback: Option<Completion>,
    ) -> Result<NodeId> {
        self.ensure(value)?;
        self.ensure(parent)?;
        let id = self.insert(NodeKind::Tracking(TrackingNode {
            value,
            parent,
            factory,
            callback: Rc::new(RefCell::new(callback)),
            retargeting: Rc::new(Cell::new(false)),
            attached: false,
        }));
        self.attach(id)?;
        Ok(id)
    }

    fn build_slots(&self, entries: IndexMap<String, Prop>) -> Result<IndexMap<String, Slot>> {
        entries
            .into_iter()
            .map(|(key, prop)| {
                let slot = match prop {
                    Prop::Static(value) => Slot::Static(value),
                    Prop::Node(node) => {
                        self.ensure(node)?;
                        Slot::Node(node)
                    }
                    Prop::Map(inner) => Slot::Node(self.style(inner)?),
                    Prop::Transform(list) => Slot::Node(self.transform(list)?),
                };
                Ok((key, slot))
            })
            .collect()
    }

    /// Remove a node from the arena.
    ///
    /// Nodes that still have children are kept and a warning is reported.
    pub fn dispose(&self, id: NodeId) -> Result<()> {
        let (has_children, is_value, attached_root) = {
            let nodes = self.inner.nodes.borrow();
            let entry = nodes.get(id).ok_or(AnimationError::UnknownNode(id))?;
            let attached_root = match &entry.kind {
                NodeKind::Props(props) => props.attached,
                NodeKind::Tracking(tracking) => tracking.attached,
                _ => false,
            };
            (
                !entry.children.is_empty(),
                matches!(entry.kind, NodeKind::Value(_)),
                attached_root,
            )
        };

        if has_children {
            tracing::warn!(?id, "cannot dispose a node that still has children");
            return Ok(());
        }
        if attached_root {
            self.detach(id)?;
        }
        if is_value {
            self.stop_animation(id)?;
        }

        self.inner.nodes.borrow_mut().remove(id);
        tracing::trace!(?id, "node disposed");
        Ok(())
    }

    // ========================================================================
    // Children and attachment
    // ========================================================================

    /// Register `child` as a dependent of `parent`.
    ///
    /// The first child attaches `parent` before it is appended.
    pub fn add_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let first = {
            let nodes = self.inner.nodes.borrow();
            let entry = nodes.get(parent).ok_or(AnimationError::UnknownNode(parent))?;
            if !entry.kind.accepts_children() {
                return Err(AnimationError::unsupported(parent, "add_child"));
            }
            if entry.children.contains(&child) {
                tracing::debug!(?parent, ?child, "child already registered");
                return Ok(());
            }
            entry.children.is_empty()
        };

        if first {
            self.attach(parent)?;
        }

        let mut nodes = self.inner.nodes.borrow_mut();
        let entry = nodes
            .get_mut(parent)
            .ok_or(AnimationError::UnknownNode(parent))?;
        entry.children.push(child);
        Ok(())
    }

    /// Unregister `child` from `parent`.
    ///
    /// Removing a child that is not present only reports a warning. Removing
    /// the last child detaches `parent`.
    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let now_empty = {
            let mut nodes = self.inner.nodes.borrow_mut();
            let entry = nodes
                .get_mut(parent)
                .ok_or(AnimationError::UnknownNode(parent))?;
            let Some(index) = entry.children.iter().position(|c| *c == child) else {
                tracing::warn!(?parent, ?child, "trying to remove a child that doesn't exist");
                return Ok(());
            };
            entry.children.remove(index);
            entry.children.is_empty()
        };

        if now_empty {
            self.detach(parent)?;
        }
        Ok(())
    }

    /// Current dependents of `id`, in attach order
    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let nodes = self.inner.nodes.borrow();
        let entry = nodes.get(id).ok_or(AnimationError::UnknownNode(id))?;
        Ok(entry.children.to_vec())
    }

    /// Nodes `id` reads from, deduplicated in declaration order
    fn dependencies(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let nodes = self.inner.nodes.borrow();
        let entry = nodes.get(id).ok_or(AnimationError::UnknownNode(id))?;
        let mut deps: Vec<NodeId> = match &entry.kind {
            NodeKind::Value(_) => Vec::new(),
            NodeKind::Interpolation(interp) => vec![interp.parent],
            NodeKind::Pair(pair) => vec![pair.x, pair.y],
            NodeKind::Transform(list) => list
                .iter()
                .filter_map(|entry| match entry.arg {
                    TransformArg::Node(node) => Some(node),
                    TransformArg::Static(_) => None,
                })
                .collect(),
            NodeKind::Style(slots) => slot_nodes(slots),
            NodeKind::Props(props) => slot_nodes(&props.entries),
            NodeKind::Tracking(tracking) => vec![tracking.parent],
        };

        let mut seen = FxHashSet::default();
        deps.retain(|dep| seen.insert(*dep));
        Ok(deps)
    }

    /// Subscribe `id` to everything it reads from
    pub fn attach(&self, id: NodeId) -> Result<()> {
        for dep in self.dependencies(id)? {
            self.add_child(dep, id)?;
        }

        let mut nodes = self.inner.nodes.borrow_mut();
        if let Some(entry) = nodes.get_mut(id) {
            tracing::debug!(?id, kind = entry.kind.name(), "attach");
            match &mut entry.kind {
                NodeKind::Props(props) => props.attached = true,
                NodeKind::Tracking(tracking) => tracking.attached = true,
                _ => {}
            }
        }
        Ok(())
    }

    /// Undo exactly the subscriptions made by [`Graph::attach`]
    pub fn detach(&self, id: NodeId) -> Result<()> {
        let is_value = {
            let mut nodes = self.inner.nodes.borrow_mut();
            let entry = nodes.get_mut(id).ok_or(AnimationError::UnknownNode(id))?;
            tracing::debug!(?id, kind = entry.kind.name(), "detach");
            match &mut entry.kind {
                NodeKind::Props(props) => props.attached = false,
                NodeKind::Tracking(tracking) => tracking.attached = false,
                _ => {}
            }
            matches!(entry.kind, NodeKind::Value(_))
        };

        if is_value {
            // A value nobody reads from has no reason to keep animating.
            self.stop_animation(id)?;
        }

        for dep in self.dependencies(id)? {
            self.remove_child(dep, id)?;
        }
        Ok(())
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Resolve the full value tree of `id`
    pub fn get_value(&self, id: NodeId) -> Result<NodeValue> {
        self.read(id, false)
    }

    /// Resolve only the node-backed entries of style and props maps.
    ///
    /// Other nodes resolve exactly as [`Graph::get_value`].
    pub fn get_animated_value(&self, id: NodeId) -> Result<NodeValue> {
        self.read(id, true)
    }

    /// Resolve `id` and require a number
    pub fn number(&self, id: NodeId) -> Result<f64> {
        let value = self.get_value(id)?;
        value.as_number().ok_or_else(|| AnimationError::TypeMismatch {
            expected: "number",
            found: value.kind().to_string(),
            context: format!("reading node {id:?}"),
        })
    }

    fn read(&self, id: NodeId, animated_only: bool) -> Result<NodeValue> {
        let source = {
            let nodes = self.inner.nodes.borrow();
            let entry = nodes.get(id).ok_or(AnimationError::UnknownNode(id))?;
            match &entry.kind {
                NodeKind::Value(value) => return Ok(NodeValue::Number(value.value + value.offset)),
                NodeKind::Interpolation(interp) => {
                    ReadSource::Interpolation(interp.parent, interp.mapping.clone())
                }
                NodeKind::Pair(pair) => ReadSource::Pair(pair.x, pair.y),
                NodeKind::Transform(list) => ReadSource::Transform(list.clone()),
                NodeKind::Style(slots) => ReadSource::Map(slots.clone()),
                NodeKind::Props(props) => ReadSource::Map(props.entries.clone()),
                NodeKind::Tracking(tracking) => ReadSource::Forward(tracking.parent),
            }
        };

        match source {
            ReadSource::Interpolation(parent, mapping) => {
                let input = self.get_value(parent)?;
                match input {
                    NodeValue::Number(n) => Ok(mapping(n)),
                    other => Err(AnimationError::TypeMismatch {
                        expected: "number",
                        found: other.kind().to_string(),
                        context: format!("interpolating node {id:?}"),
                    }),
                }
            }
            ReadSource::Pair(x, y) => {
                let mut map = IndexMap::with_capacity(2);
                map.insert("x".to_string(), self.get_value(x)?);
                map.insert("y".to_string(), self.get_value(y)?);
                Ok(NodeValue::Map(map))
            }
            ReadSource::Transform(list) => {
                let mut parts = Vec::with_capacity(list.len());
                for entry in list {
                    let args = match entry.arg {
                        TransformArg::Node(node) => self.get_value(node)?.to_string(),
                        TransformArg::Static(values) => NodeValue::List(values).to_string(),
                    };
                    parts.push(format!("{}({})", entry.name, args));
                }
                Ok(NodeValue::Text(parts.join(" ")))
            }
            ReadSource::Map(slots) => {
                let mut map = IndexMap::with_capacity(slots.len());
                for (key, slot) in slots {
                    match slot {
                        Slot::Node(node) => {
                            map.insert(key, self.read(node, animated_only)?);
                        }
                        Slot::Static(value) if !animated_only => {
                            map.insert(key, value);
                        }
                        Slot::Static(_) => {}
                    }
                }
                Ok(NodeValue::Map(map))
            }
            ReadSource::Forward(parent) => self.read(parent, animated_only),
        }
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Run the two-phase update starting at `root`.
    ///
    /// Every terminal node reachable from `root` is updated exactly once, after
    /// discovery has finished.
    pub fn flush(&self, root: NodeId) -> Result<()> {
        let terminals = {
            let nodes = self.inner.nodes.borrow();
            let mut visited = FxHashSet::default();
            let mut terminals = Vec::new();
            let mut stack = vec![root];

            while let Some(id) = stack.pop() {
                let Some(entry) = nodes.get(id) else {
                    continue;
                };
                if !visited.insert(id) {
                    continue;
                }
                if entry.kind.is_terminal() {
                    terminals.push(id);
                } else {
                    stack.extend(entry.children.iter().rev().copied());
                }
            }
            terminals
        };

        tracing::trace!(?root, terminals = terminals.len(), "flush");
        for id in terminals {
            self.update(id)?;
        }
        Ok(())
    }

    /// Update a terminal node: commit a props node or re-target a tracking node
    pub fn update(&self, id: NodeId) -> Result<()> {
        enum Terminal {
            Props(Option<CommitFn>),
            Tracking,
        }

        let terminal = {
            let nodes = self.inner.nodes.borrow();
            let entry = nodes.get(id).ok_or(AnimationError::UnknownNode(id))?;
            match &entry.kind {
                NodeKind::Props(props) => {
                    Terminal::Props(props.attached.then(|| props.commit.clone()))
                }
                NodeKind::Tracking(_) => Terminal::Tracking,
                _ => return Err(AnimationError::unsupported(id, "update")),
            }
        };

        match terminal {
            Terminal::Props(Some(commit)) => {
                commit();
                Ok(())
            }
            Terminal::Props(None) => {
                tracing::debug!(?id, "skipping commit of detached props");
                Ok(())
            }
            Terminal::Tracking => self.retarget(id),
        }
    }

    // ========================================================================
    // Value nodes
    // ========================================================================

    /// Set the stored value, stopping any active driver first.
    ///
    /// Setting the current value again does nothing.
    pub fn set_value(&self, id: NodeId, value: f64) -> Result<()> {
        let active = self.with_value(id, "set_value", |node| node.animation.take())?;
        if let Some(active) = active {
            active.animation.stop();
        }
        self.update_value(id, value)
    }

    /// Replace the offset added at read time. Does not flush or notify.
    pub fn set_offset(&self, id: NodeId, offset: f64) -> Result<()> {
        self.with_value(id, "set_offset", |node| node.offset = offset)
    }

    /// Set both components of a pair
    pub fn set_value_xy(&self, id: NodeId, x: f64, y: f64) -> Result<()> {
        let (x_id, y_id) = self.pair_components(id)?;
        self.set_value(x_id, x)?;
        self.set_value(y_id, y)
    }

    /// Set both component offsets of a pair
    pub fn set_offset_xy(&self, id: NodeId, x: f64, y: f64) -> Result<()> {
        let (x_id, y_id) = self.pair_components(id)?;
        self.set_offset(x_id, x)?;
        self.set_offset(y_id, y)
    }

    /// The stored value without offset
    pub fn stored_value(&self, id: NodeId) -> Result<f64> {
        self.with_value(id, "stored_value", |node| node.value)
    }

    pub fn is_animating(&self, id: NodeId) -> Result<bool> {
        self.with_value(id, "is_animating", |node| node.animation.is_some())
    }

    /// The tracking node currently bound to a value node
    pub fn active_tracking(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.with_value(id, "active_tracking", |node| node.tracking)
    }

    /// The value nodes behind a pair
    pub fn pair_components(&self, id: NodeId) -> Result<(NodeId, NodeId)> {
        let nodes = self.inner.nodes.borrow();
        match nodes.get(id).map(|entry| &entry.kind) {
            Some(NodeKind::Pair(pair)) => Ok((pair.x, pair.y)),
            Some(_) => Err(AnimationError::unsupported(id, "pair_components")),
            None => Err(AnimationError::UnknownNode(id)),
        }
    }

    /// `{left, top}` style entries bound to a pair
    pub fn layout(&self, id: NodeId) -> Result<IndexMap<String, Prop>> {
        let (x, y) = self.pair_components(id)?;
        let mut map = IndexMap::with_capacity(2);
        map.insert("left".to_string(), Prop::Node(x));
        map.insert("top".to_string(), Prop::Node(y));
        Ok(map)
    }

    /// `translateX`/`translateY` transform entries bound to a pair
    pub fn translate_transform(&self, id: NodeId) -> Result<Vec<TransformEntry>> {
        let (x, y) = self.pair_components(id)?;
        Ok(vec![
            TransformEntry::node("translateX", x),
            TransformEntry::node("translateY", y),
        ])
    }

    fn with_value<R>(
        &self,
        id: NodeId,
        operation: &'static str,
        f: impl FnOnce(&mut ValueNode) -> R,
    ) -> Result<R> {
        let mut nodes = self.inner.nodes.borrow_mut();
        match nodes.get_mut(id).map(|entry| &mut entry.kind) {
            Some(NodeKind::Value(node)) => Ok(f(node)),
            Some(_) => Err(AnimationError::unsupported(id, operation)),
            None => Err(AnimationError::UnknownNode(id)),
        }
    }

    /// Store a new value, flush, then notify listeners.
    ///
    /// Strictly equal values short-circuit before any downstream work.
    fn update_value(&self, id: NodeId, value: f64) -> Result<()> {
        let changed = self.with_value(id, "update_value", |node| {
            if node.value == value {
                false
            } else {
                node.value = value;
                true
            }
        })?;
        if !changed {
            return Ok(());
        }

        tracing::trace!(?id, value, "value changed");
        self.flush(id)?;
        self.notify(id)
    }

    /// Start `animation` on a value node, replacing any active driver.
    ///
    /// The replaced driver is stopped and its state offered to the new one.
    pub fn animate(
        &self,
        id: NodeId,
        animation: Rc<dyn Animation>,
        callback: Option<Completion>,
    ) -> Result<()> {
        let previous = self.with_value(id, "animate", |node| node.animation.take())?;
        let handoff = previous
            .as_ref()
            .and_then(|active| active.animation.motion_state());
        if let Some(previous) = previous {
            previous.animation.stop();
        }

        let generation = self.inner.next_generation.get();
        self.inner.next_generation.set(generation + 1);

        let from = self.with_value(id, "animate", |node| {
            node.animation = Some(ActiveAnimation {
                animation: animation.clone(),
                generation,
            });
            node.value
        })?;

        let graph = self.downgrade();
        let on_update: UpdateFn = Rc::new({
            let graph = graph.clone();
            move |value| match graph.upgrade() {
                Some(graph) => graph.update_value(id, value),
                None => Ok(()),
            }
        });
        let on_end: Completion = Box::new(move |result| {
            if let Some(graph) = graph.upgrade() {
                graph.clear_animation(id, generation);
            }
            tracing::debug!(?id, generation, ?result, "animation ended");
            if let Some(callback) = callback {
                callback(result);
            }
        });

        tracing::debug!(?id, generation, from, "animation started");
        animation.start(AnimationStart {
            from,
            scheduler: self.scheduler(),
            on_update,
            on_end,
            previous: handoff,
        })
    }

    fn clear_animation(&self, id: NodeId, generation: u64) {
        let cleared = self.with_value(id, "clear_animation", |node| {
            if node
                .animation
                .as_ref()
                .is_some_and(|active| active.generation == generation)
            {
                node.animation = None;
            }
        });
        if let Err(err) = cleared {
            tracing::trace!(?id, error = %err, "animation ended on a node that is gone");
        }
    }

    /// Stop tracking and any active driver, returning the stored value.
    ///
    /// On a pair both components stop and a `{x, y}` map is returned.
    pub fn stop_animation(&self, id: NodeId) -> Result<NodeValue> {
        if let Ok((x, y)) = self.pair_components(id) {
            let mut map = IndexMap::with_capacity(2);
            map.insert("x".to_string(), self.stop_animation(x)?);
            map.insert("y".to_string(), self.stop_animation(y)?);
            return Ok(NodeValue::Map(map));
        }

        self.stop_tracking(id)?;
        let active = self.with_value(id, "stop_animation", |node| node.animation.take())?;
        if let Some(active) = active {
            active.animation.stop();
        }
        self.stored_value(id).map(NodeValue::Number)
    }

    /// Detach and free the current tracking binding, if any
    pub fn stop_tracking(&self, id: NodeId) -> Result<()> {
        let tracking = self.with_value(id, "stop_tracking", |node| node.tracking.take())?;
        if let Some(tracking) = tracking {
            if self.contains(tracking) {
                self.detach(tracking)?;
                self.dispose(tracking)?;
            }
        }
        Ok(())
    }

    /// Install a tracking binding on a value node, replacing the previous one,
    /// and aim it at the current target.
    ///
    /// The binding must have been created for `id`.
    pub fn track(&self, id: NodeId, tracking: NodeId) -> Result<()> {
        let bound_to = {
            let nodes = self.inner.nodes.borrow();
            match nodes.get(tracking).map(|entry| &entry.kind) {
                Some(NodeKind::Tracking(binding)) => binding.value,
                Some(_) => return Err(AnimationError::unsupported(tracking, "track")),
                None => return Err(AnimationError::UnknownNode(tracking)),
            }
        };
        if bound_to != id {
            return Err(AnimationError::unsupported(tracking, "track"));
        }
        self.stop_tracking(id)?;
        self.with_value(id, "track", |node| node.tracking = Some(tracking))?;
        self.update(tracking)
    }

    fn retarget(&self, id: NodeId) -> Result<()> {
        let (value, parent, factory, callback, retargeting, attached) = {
            let nodes = self.inner.nodes.borrow();
            match nodes.get(id).map(|entry| &entry.kind) {
                Some(NodeKind::Tracking(tracking)) => (
                    tracking.value,
                    tracking.parent,
                    tracking.factory.clone(),
                    tracking.callback.clone(),
                    tracking.retargeting.clone(),
                    tracking.attached,
                ),
                Some(_) => return Err(AnimationError::unsupported(id, "retarget")),
                None => return Err(AnimationError::UnknownNode(id)),
            }
        };

        if !attached {
            tracing::warn!(?id, "tracking node updated after it was detached");
            return Ok(());
        }

        let target = self.number(parent)?;
        let animation = factory(target)?;
        tracing::debug!(?id, ?value, target, "tracking retarget");

        let suppress = retargeting.clone();
        let on_end: Completion = Box::new(move |result| {
            if result == AnimationResult::Cancelled && suppress.get() {
                return;
            }
            let callback = callback.borrow_mut().take();
            if let Some(callback) = callback {
                callback(result);
            }
        });

        retargeting.set(true);
        let started = self.animate(value, animation, Some(on_end));
        retargeting.set(false);
        started
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Register `listener` to run with the node's value after every mutation.
    ///
    /// Interpolations subscribe to their parent lazily on the first listener;
    /// pairs report their joint `{x, y}` value when either component changes.
    pub fn add_listener(&self, id: NodeId, listener: Listener) -> Result<ListenerId> {
        self.add_entry(id, ListenerEntry::Callback(listener))
    }

    fn add_entry(&self, id: NodeId, entry: ListenerEntry) -> Result<ListenerId> {
        enum Target {
            Registry,
            Interpolation { parent: NodeId, subscribed: bool },
            Pair(NodeId, NodeId),
        }

        let target = {
            let nodes = self.inner.nodes.borrow();
            match nodes.get(id).map(|entry| &entry.kind) {
                Some(NodeKind::Value(_)) => Target::Registry,
                Some(NodeKind::Interpolation(interp)) => Target::Interpolation {
                    parent: interp.parent,
                    subscribed: interp.parent_listener.is_some(),
                },
                Some(NodeKind::Pair(pair)) => Target::Pair(pair.x, pair.y),
                Some(_) => return Err(AnimationError::unsupported(id, "add_listener")),
                None => return Err(AnimationError::UnknownNode(id)),
            }
        };

        match target {
            Target::Registry => Ok(self.with_registry(id, |registry| registry.insert(entry))?),
            Target::Interpolation { parent, subscribed } => {
                if !subscribed {
                    let parent_listener = self.add_entry(parent, ListenerEntry::Fanout(id))?;
                    self.with_interpolation(id, |interp| {
                        interp.parent_listener = Some(parent_listener)
                    })?;
                }
                self.with_registry(id, |registry| registry.insert(entry))
            }
            Target::Pair(x, y) => {
                let relayed = match entry {
                    ListenerEntry::Callback(listener) => {
                        ListenerEntry::Relay { node: id, listener }
                    }
                    other => other,
                };
                let x_listener = self.add_entry(x, relayed.clone())?;
                let y_listener = self.add_entry(y, relayed)?;

                let mut nodes = self.inner.nodes.borrow_mut();
                match nodes.get_mut(id).map(|entry| &mut entry.kind) {
                    Some(NodeKind::Pair(pair)) => {
                        let listener_id = ListenerId(pair.next_listener);
                        pair.next_listener += 1;
                        pair.joint.insert(listener_id, (x_listener, y_listener));
                        Ok(listener_id)
                    }
                    _ => Err(AnimationError::UnknownNode(id)),
                }
            }
        }
    }

    /// Remove one listener. Unknown ids only report a warning.
    pub fn remove_listener(&self, id: NodeId, listener: ListenerId) -> Result<()> {
        if let Ok((x, y)) = self.pair_components(id) {
            let joint = {
                let mut nodes = self.inner.nodes.borrow_mut();
                match nodes.get_mut(id).map(|entry| &mut entry.kind) {
                    Some(NodeKind::Pair(pair)) => pair.joint.shift_remove(&listener),
                    _ => None,
                }
            };
            return match joint {
                Some((x_listener, y_listener)) => {
                    self.remove_listener(x, x_listener)?;
                    self.remove_listener(y, y_listener)
                }
                None => {
                    tracing::warn!(?id, ?listener, "removing unknown listener");
                    Ok(())
                }
            };
        }

        let (removed, remaining) = self.with_registry(id, |registry| {
            (registry.remove(listener).is_some(), registry.len())
        })?;
        if !removed {
            tracing::warn!(?id, ?listener, "removing unknown listener");
        }
        if remaining == 0 {
            self.unsubscribe_interpolation(id)?;
        }
        Ok(())
    }

    /// Remove every listener registered directly on this node
    pub fn remove_all_listeners(&self, id: NodeId) -> Result<()> {
        if self.pair_components(id).is_ok() {
            let joint: Vec<ListenerId> = {
                let nodes = self.inner.nodes.borrow();
                match nodes.get(id).map(|entry| &entry.kind) {
                    Some(NodeKind::Pair(pair)) => pair.joint.keys().copied().collect(),
                    _ => Vec::new(),
                }
            };
            for listener in joint {
                self.remove_listener(id, listener)?;
            }
            return Ok(());
        }

        // Relay and fan-out entries belong to other nodes and stay registered.
        let remaining = self.with_registry(id, |registry| {
            registry.retain(|entry| !matches!(entry, ListenerEntry::Callback(_)));
            registry.len()
        })?;
        if remaining == 0 {
            self.unsubscribe_interpolation(id)?;
        }
        Ok(())
    }

    fn unsubscribe_interpolation(&self, id: NodeId) -> Result<()> {
        let subscription = {
            let mut nodes = self.inner.nodes.borrow_mut();
            match nodes.get_mut(id).map(|entry| &mut entry.kind) {
                Some(NodeKind::Interpolation(interp)) => interp
                    .parent_listener
                    .take()
                    .map(|listener| (interp.parent, listener)),
                _ => None,
            }
        };
        match subscription {
            Some((parent, listener)) => self.remove_listener(parent, listener),
            None => Ok(()),
        }
    }

    fn with_registry<R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut ListenerRegistry) -> R,
    ) -> Result<R> {
        let mut nodes = self.inner.nodes.borrow_mut();
        match nodes.get_mut(id).map(|entry| &mut entry.kind) {
            Some(NodeKind::Value(node)) => Ok(f(&mut node.listeners)),
            Some(NodeKind::Interpolation(interp)) => Ok(f(&mut interp.listeners)),
            Some(_) => Err(AnimationError::unsupported(id, "listeners")),
            None => Err(AnimationError::UnknownNode(id)),
        }
    }

    fn with_interpolation<R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut InterpolationNode) -> R,
    ) -> Result<R> {
        let mut nodes = self.inner.nodes.borrow_mut();
        match nodes.get_mut(id).map(|entry| &mut entry.kind) {
            Some(NodeKind::Interpolation(interp)) => Ok(f(interp)),
            Some(_) => Err(AnimationError::unsupported(id, "interpolation")),
            None => Err(AnimationError::UnknownNode(id)),
        }
    }

    /// Run every listener registered on `id`
    fn notify(&self, id: NodeId) -> Result<()> {
        let entries = self.with_registry(id, |registry| registry.snapshot())?;
        if entries.is_empty() {
            return Ok(());
        }

        let mut own_value = None;
        for entry in entries {
            match entry {
                ListenerEntry::Callback(listener) => {
                    if own_value.is_none() {
                        own_value = Some(self.get_value(id)?);
                    }
                    if let Some(value) = &own_value {
                        listener(value);
                    }
                }
                ListenerEntry::Relay { node, listener } => {
                    let value = self.get_value(node)?;
                    listener(&value);
                }
                ListenerEntry::Fanout(node) => {
                    if self.contains(node) {
                        self.notify(node)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn slot_nodes(slots: &IndexMap<String, Slot>) -> Vec<NodeId> {
    slots
        .values()
        .filter_map(|slot| match slot {
            Slot::Node(node) => Some(*node),
            Slot::Static(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    fn graph() -> Graph {
        Graph::new(Rc::new(ManualScheduler::new()))
    }

    fn counter() -> (Rc<Cell<u32>>, CommitFn) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        (count, Rc::new(move || count_clone.set(count_clone.get() + 1)))
    }

    fn doubled(graph: &Graph, parent: NodeId) -> NodeId {
        graph
            .interpolation(parent, Rc::new(|n| NodeValue::Number(n * 2.0)))
            .unwrap()
    }

    #[test]
    fn test_value_reads_include_offset() {
        let graph = graph();
        let value = graph.value(10.0);
        graph.set_offset(value, 5.0).unwrap();

        assert_eq!(graph.get_value(value).unwrap(), NodeValue::Number(15.0));
        assert_eq!(graph.stored_value(value).unwrap(), 10.0);
    }

    #[test]
    fn test_set_value_notifies_each_listener_once() {
        let graph = graph();
        let value = graph.value(0.0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        for _ in 0..2 {
            let seen = seen.clone();
            graph
                .add_listener(value, Rc::new(move |v| seen.borrow_mut().push(v.clone())))
                .unwrap();
        }

        graph.set_value(value, 3.0).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![NodeValue::Number(3.0), NodeValue::Number(3.0)]
        );
    }

    #[test]
    fn test_equal_value_is_a_no_op() {
        let graph = graph();
        let value = graph.value(1.0);
        let (commits, commit) = counter();
        let mut style = IndexMap::new();
        style.insert("opacity".to_string(), Prop::Node(value));
        graph.props(style, commit).unwrap();

        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        graph
            .add_listener(value, Rc::new(move |_| calls_clone.set(calls_clone.get() + 1)))
            .unwrap();

        graph.set_value(value, 1.0).unwrap();
        assert_eq!(commits.get(), 0);
        assert_eq!(calls.get(), 0);

        graph.set_value(value, 2.0).unwrap();
        assert_eq!(commits.get(), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_set_offset_does_not_flush() {
        let graph = graph();
        let value = graph.value(1.0);
        let (commits, commit) = counter();
        let mut map = IndexMap::new();
        map.insert("left".to_string(), Prop::Node(value));
        graph.props(map, commit).unwrap();

        graph.set_offset(value, 10.0).unwrap();
        assert_eq!(commits.get(), 0);
    }

    #[test]
    fn test_removing_missing_child_is_a_warning() {
        let graph = graph();
        let value = graph.value(0.0);
        let other = graph.value(0.0);

        assert!(graph.remove_child(value, other).is_ok());
        assert!(graph.children(value).unwrap().is_empty());
    }

    #[test]
    fn test_attach_detach_balance_through_style_and_props() {
        let graph = graph();
        let value = graph.value(0.0);

        let mut style = IndexMap::new();
        style.insert("left".to_string(), Prop::Node(value));
        style.insert("top".to_string(), Prop::Node(value));
        let mut props = IndexMap::new();
        props.insert("style".to_string(), Prop::Map(style));

        let (_, commit) = counter();
        let props = graph.props(props, commit).unwrap();

        let style_id = graph.children(value).unwrap()[0];
        assert_eq!(graph.children(style_id).unwrap(), vec![props]);

        graph.detach(props).unwrap();
        assert!(graph.children(value).unwrap().is_empty());
        assert!(graph.children(style_id).unwrap().is_empty());
    }

    #[test]
    fn test_props_commit_once_per_flush_for_shared_leaves() {
        let graph = graph();
        let value = graph.value(0.0);
        let double = doubled(&graph, value);

        let mut style = IndexMap::new();
        style.insert("left".to_string(), Prop::Node(value));
        style.insert("width".to_string(), Prop::Node(double));
        style.insert(
            "transform".to_string(),
            Prop::Transform(vec![TransformEntry::node("translateX", double)]),
        );
        let mut props = IndexMap::new();
        props.insert("style".to_string(), Prop::Map(style));

        let (commits, commit) = counter();
        let props = graph.props(props, commit).unwrap();

        graph.set_value(value, 4.0).unwrap();
        assert_eq!(commits.get(), 1);

        let resolved = graph.get_value(props).unwrap();
        let style = resolved.get("style").unwrap();
        assert_eq!(style.get("left"), Some(&NodeValue::Number(4.0)));
        assert_eq!(style.get("width"), Some(&NodeValue::Number(8.0)));
        assert_eq!(
            style.get("transform"),
            Some(&NodeValue::Text("translateX(8)".to_string()))
        );
    }

    #[test]
    fn test_animated_value_contains_only_node_entries() {
        let graph = graph();
        let value = graph.value(2.0);
        let mut map = IndexMap::new();
        map.insert("opacity".to_string(), Prop::Node(value));
        map.insert("color".to_string(), Prop::from("red"));
        let style = graph.style(map).unwrap();

        let animated = graph.get_animated_value(style).unwrap();
        assert_eq!(animated.get("opacity"), Some(&NodeValue::Number(2.0)));
        assert_eq!(animated.get("color"), None);

        let full = graph.get_value(style).unwrap();
        assert_eq!(full.get("color"), Some(&NodeValue::from("red")));
    }

    #[test]
    fn test_transform_renders_static_and_node_entries() {
        let graph = graph();
        let angle = graph.value(45.0);
        let degrees = graph
            .interpolation(angle, Rc::new(|n| NodeValue::Text(format!("{n}deg"))))
            .unwrap();
        let transform = graph
            .transform(vec![
                TransformEntry::fixed(
                    "translate",
                    vec![NodeValue::Number(10.0), NodeValue::Number(20.5)],
                ),
                TransformEntry::node("rotate", degrees),
            ])
            .unwrap();

        assert_eq!(
            graph.get_value(transform).unwrap(),
            NodeValue::Text("translate(10,20.5) rotate(45deg)".to_string())
        );
    }

    #[test]
    fn test_interpolating_non_numeric_parent_fails() {
        let graph = graph();
        let value = graph.value(1.0);
        let text = graph
            .interpolation(value, Rc::new(|_| NodeValue::from("1px")))
            .unwrap();
        let nested = doubled(&graph, text);

        assert!(matches!(
            graph.get_value(nested),
            Err(AnimationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_nested_interpolation_attach_and_detach() {
        let graph = graph();
        let value = graph.value(1.0);
        let inner = doubled(&graph, value);
        let outer = doubled(&graph, inner);

        let mut map = IndexMap::new();
        map.insert("width".to_string(), Prop::Node(outer));
        let (_, commit) = counter();
        let props = graph.props(map, commit).unwrap();

        assert_eq!(graph.children(value).unwrap(), vec![inner]);
        assert_eq!(graph.children(inner).unwrap(), vec![outer]);
        assert_eq!(graph.children(outer).unwrap(), vec![props]);
        assert_eq!(graph.get_value(outer).unwrap(), NodeValue::Number(4.0));

        graph.detach(props).unwrap();
        assert!(graph.children(outer).unwrap().is_empty());
        assert!(graph.children(inner).unwrap().is_empty());
        assert!(graph.children(value).unwrap().is_empty());
    }

    #[test]
    fn test_interpolation_listener_fans_out() {
        let graph = graph();
        let value = graph.value(1.0);
        let double = doubled(&graph, value);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_clone = seen.clone();
        let listener = graph
            .add_listener(double, Rc::new(move |v| seen_clone.borrow_mut().push(v.clone())))
            .unwrap();

        graph.set_value(value, 5.0).unwrap();
        assert_eq!(*seen.borrow(), vec![NodeValue::Number(10.0)]);

        graph.remove_listener(double, listener).unwrap();
        graph.set_value(value, 6.0).unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_pair_listener_reports_joint_value() {
        let graph = graph();
        let pair = graph.value_xy(0.0, 0.0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_clone = seen.clone();
        let listener = graph
            .add_listener(pair, Rc::new(move |v| seen_clone.borrow_mut().push(v.clone())))
            .unwrap();

        graph.set_value_xy(pair, 1.0, 2.0).unwrap();
        assert_eq!(seen.borrow().len(), 2);
        let last = seen.borrow().last().cloned().unwrap();
        assert_eq!(last.get("x"), Some(&NodeValue::Number(1.0)));
        assert_eq!(last.get("y"), Some(&NodeValue::Number(2.0)));

        graph.remove_listener(pair, listener).unwrap();
        graph.set_value_xy(pair, 3.0, 4.0).unwrap();
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_pair_layout_drives_style() {
        let graph = graph();
        let pair = graph.value_xy(5.0, 6.0);
        let style = graph.style(graph.layout(pair).unwrap()).unwrap();

        let value = graph.get_value(style).unwrap();
        assert_eq!(value.get("left"), Some(&NodeValue::Number(5.0)));
        assert_eq!(value.get("top"), Some(&NodeValue::Number(6.0)));
    }

    #[test]
    fn test_detached_props_never_commit() {
        let graph = graph();
        let value = graph.value(0.0);
        let mut map = IndexMap::new();
        map.insert("opacity".to_string(), Prop::Node(value));
        let (commits, commit) = counter();
        let props = graph.props(map, commit).unwrap();

        graph.detach(props).unwrap();
        graph.set_value(value, 1.0).unwrap();
        graph.update(props).unwrap();
        assert_eq!(commits.get(), 0);
    }

    #[test]
    fn test_dispose_keeps_nodes_with_children() {
        let graph = graph();
        let value = graph.value(0.0);
        let double = doubled(&graph, value);
        graph.attach(double).unwrap();

        graph.dispose(value).unwrap();
        assert!(graph.contains(value));

        graph.detach(double).unwrap();
        graph.dispose(double).unwrap();
        graph.dispose(value).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_remove_all_listeners_keeps_fan_out_children() {
        let graph = graph();
        let value = graph.value(1.0);
        let double = doubled(&graph, value);
        let quadruple = doubled(&graph, double);

        let own = Rc::new(Cell::new(0));
        let own_clone = own.clone();
        graph
            .add_listener(double, Rc::new(move |_| own_clone.set(own_clone.get() + 1)))
            .unwrap();
        let downstream = Rc::new(RefCell::new(Vec::new()));
        let downstream_clone = downstream.clone();
        graph
            .add_listener(
                quadruple,
                Rc::new(move |v| downstream_clone.borrow_mut().push(v.clone())),
            )
            .unwrap();

        graph.set_value(value, 2.0).unwrap();
        assert_eq!(own.get(), 1);
        assert_eq!(*downstream.borrow(), vec![NodeValue::Number(8.0)]);

        graph.remove_all_listeners(double).unwrap();
        graph.set_value(value, 3.0).unwrap();
        assert_eq!(own.get(), 1);
        assert_eq!(
            *downstream.borrow(),
            vec![NodeValue::Number(8.0), NodeValue::Number(12.0)]
        );
    }

    #[test]
    fn test_remove_all_listeners_on_pair() {
        let graph = graph();
        let pair = graph.value_xy(0.0, 0.0);
        let (x, _) = graph.pair_components(pair).unwrap();
        let joint = Rc::new(Cell::new(0));
        let component = Rc::new(Cell::new(0));

        for _ in 0..2 {
            let joint = joint.clone();
            graph
                .add_listener(pair, Rc::new(move |_| joint.set(joint.get() + 1)))
                .unwrap();
        }
        let component_clone = component.clone();
        graph
            .add_listener(x, Rc::new(move |_| component_clone.set(component_clone.get() + 1)))
            .unwrap();

        graph.remove_all_listeners(pair).unwrap();
        graph.set_value_xy(pair, 1.0, 2.0).unwrap();
        assert_eq!(joint.get(), 0);
        assert_eq!(component.get(), 1);
    }

    #[test]
    fn test_set_offset_xy_shifts_reads_only() {
        let graph = graph();
        let pair = graph.value_xy(1.0, 2.0);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        graph
            .add_listener(pair, Rc::new(move |_| calls_clone.set(calls_clone.get() + 1)))
            .unwrap();

        graph.set_offset_xy(pair, 10.0, 20.0).unwrap();

        let value = graph.get_value(pair).unwrap();
        assert_eq!(value.get("x"), Some(&NodeValue::Number(11.0)));
        assert_eq!(value.get("y"), Some(&NodeValue::Number(22.0)));
        let (x, y) = graph.pair_components(pair).unwrap();
        assert_eq!(graph.stored_value(x).unwrap(), 1.0);
        assert_eq!(graph.stored_value(y).unwrap(), 2.0);
        assert_eq!(calls.get(), 0);

        assert!(matches!(
            graph.set_offset_xy(x, 1.0, 1.0),
            Err(AnimationError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_translate_transform_follows_pair() {
        let graph = graph();
        let pair = graph.value_xy(1.0, 2.0);
        let transform = graph
            .transform(graph.translate_transform(pair).unwrap())
            .unwrap();

        assert_eq!(
            graph.get_value(transform).unwrap(),
            NodeValue::Text("translateX(1) translateY(2)".to_string())
        );

        graph.set_value_xy(pair, 8.0, -3.5).unwrap();
        assert_eq!(
            graph.get_value(transform).unwrap(),
            NodeValue::Text("translateX(8) translateY(-3.5)".to_string())
        );
    }

    /// Driver that ignores `stop` and ends only when told to
    #[derive(Default)]
    struct LateDriver {
        end: RefCell<Option<Completion>>,
    }

    impl Animation for LateDriver {
        fn start(self: Rc<Self>, start: AnimationStart) -> Result<()> {
            *self.end.borrow_mut() = Some(start.on_end);
            Ok(())
        }

        fn stop(&self) {}
    }

    #[test]
    fn test_driver_ending_after_dispose_still_reports() {
        let graph = graph();
        let value = graph.value(0.0);
        let driver = Rc::new(LateDriver::default());
        let results = Rc::new(RefCell::new(Vec::new()));

        let results_clone = results.clone();
        let done: Completion = Box::new(move |result| results_clone.borrow_mut().push(result));
        graph.animate(value, driver.clone(), Some(done)).unwrap();
        graph.dispose(value).unwrap();
        assert!(!graph.contains(value));

        let end = driver.end.borrow_mut().take().unwrap();
        end(AnimationResult::Completed);
        assert_eq!(*results.borrow(), vec![AnimationResult::Completed]);
    }

    #[test]
    fn test_update_on_non_terminal_is_unsupported() {
        let graph = graph();
        let value = graph.value(0.0);
        assert!(matches!(
            graph.update(value),
            Err(AnimationError::UnsupportedOperation { .. })
        ));
    }
}
