//! Event-to-value mapping
//!
//! An [`EventMapper`] walks incoming event payloads alongside a mapping tree
//! and writes every number it finds at a node leaf into that value node.
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use drift_animation::{EventConfig, EventMapper, EventMapping};
//! use drift_core::{Graph, ManualScheduler};
//! use serde_json::json;
//!
//! let graph = Graph::new(Rc::new(ManualScheduler::new()));
//! let x = graph.value(0.0);
//!
//! let mapper = EventMapper::new(
//!     &graph,
//!     vec![EventMapping::object([(
//!         "nativeEvent",
//!         EventMapping::object([("x", EventMapping::Node(x))]),
//!     )])],
//!     EventConfig::default(),
//! );
//!
//! mapper.handle(&[json!({ "nativeEvent": { "x": 42 } })]).unwrap();
//! assert_eq!(graph.stored_value(x).unwrap(), 42.0);
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use drift_core::{AnimationError, Graph, NodeId, Result, Scheduler, TimerHandle};
use indexmap::IndexMap;
use serde_json::Value;

/// Shape of one event argument
#[derive(Clone, Debug)]
pub enum EventMapping {
    /// Write the number found here into the node
    Node(NodeId),
    /// Descend into the object field of the same name
    Object(IndexMap<String, EventMapping>),
    /// Skip this part of the event
    Ignore,
}

impl EventMapping {
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, EventMapping)>) -> Self {
        EventMapping::Object(
            entries
                .into_iter()
                .map(|(key, mapping)| (key.into(), mapping))
                .collect(),
        )
    }
}

/// Receives the raw event arguments after they were mapped
pub type EventListener = Rc<dyn Fn(&[Value])>;

/// Configuration for an [`EventMapper`]
#[derive(Clone, Default)]
pub struct EventConfig {
    pub listener: Option<EventListener>,
    /// Minimum milliseconds between listener calls. Events arriving sooner are
    /// coalesced into one delivery at the period boundary.
    pub update_period: Option<f64>,
}

impl EventConfig {
    pub fn listener(mut self, listener: impl Fn(&[Value]) + 'static) -> Self {
        self.listener = Some(Rc::new(listener));
        self
    }

    pub fn update_period(mut self, ms: f64) -> Self {
        self.update_period = Some(ms);
        self
    }
}

struct Throttle {
    scheduler: Rc<dyn Scheduler>,
    listener: EventListener,
    period: f64,
    last_fired: Cell<Option<f64>>,
    pending: RefCell<Option<Vec<Value>>>,
    timer: Cell<Option<TimerHandle>>,
}

impl Throttle {
    fn deliver(self: &Rc<Self>, args: &[Value]) {
        let now = self.scheduler.now();
        let due = self
            .last_fired
            .get()
            .map_or(true, |last| now - last >= self.period);

        if due && self.timer.get().is_none() {
            self.last_fired.set(Some(now));
            (self.listener)(args);
            return;
        }

        *self.pending.borrow_mut() = Some(args.to_vec());
        if self.timer.get().is_none() {
            let wait = self
                .last_fired
                .get()
                .map_or(0.0, |last| last + self.period - now);
            let this = self.clone();
            let handle = self.scheduler.set_timeout(
                Box::new(move || {
                    this.flush_pending();
                    Ok(())
                }),
                wait.max(0.0),
            );
            self.timer.set(Some(handle));
        }
    }

    fn flush_pending(&self) {
        self.timer.set(None);
        let pending = self.pending.borrow_mut().take();
        if let Some(args) = pending {
            self.last_fired.set(Some(self.scheduler.now()));
            (self.listener)(&args);
        }
    }

    fn cancel(&self) {
        if let Some(handle) = self.timer.take() {
            self.scheduler.clear_timeout(handle);
        }
        self.pending.borrow_mut().take();
    }
}

/// Maps event payloads onto value nodes and forwards them to an optional listener
pub struct EventMapper {
    graph: Graph,
    mapping: Vec<EventMapping>,
    listener: Option<EventListener>,
    throttle: Option<Rc<Throttle>>,
    enabled: Cell<bool>,
}

impl EventMapper {
    pub fn new(graph: &Graph, mapping: Vec<EventMapping>, config: EventConfig) -> Self {
        let throttle = match (&config.listener, config.update_period) {
            (Some(listener), Some(period)) if period > 0.0 => Some(Rc::new(Throttle {
                scheduler: graph.scheduler(),
                listener: listener.clone(),
                period,
                last_fired: Cell::new(None),
                pending: RefCell::new(None),
                timer: Cell::new(None),
            })),
            _ => None,
        };

        Self {
            graph: graph.clone(),
            mapping,
            listener: config.listener,
            throttle,
            enabled: Cell::new(true),
        }
    }

    /// Map one event. Argument `i` is matched against mapping entry `i`.
    pub fn handle(&self, args: &[Value]) -> Result<()> {
        if !self.enabled.get() {
            return Ok(());
        }

        for (index, mapping) in self.mapping.iter().enumerate() {
            self.traverse(mapping, args.get(index), &format!("arg{index}"))?;
        }

        match (&self.throttle, &self.listener) {
            (Some(throttle), _) => throttle.deliver(args),
            (None, Some(listener)) => listener(args),
            (None, None) => {}
        }
        Ok(())
    }

    /// Disabling suppresses mapping and drops any coalesced delivery
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
        if !enabled {
            if let Some(throttle) = &self.throttle {
                throttle.cancel();
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn traverse(&self, mapping: &EventMapping, event: Option<&Value>, key: &str) -> Result<()> {
        match mapping {
            EventMapping::Ignore => Ok(()),
            EventMapping::Node(node) => match event.and_then(Value::as_f64) {
                Some(number) => self.graph.set_value(*node, number),
                None => Err(mismatch("number", event, key)),
            },
            EventMapping::Object(fields) => {
                let Some(Value::Object(object)) = event else {
                    return Err(mismatch("object", event, key));
                };
                for (field, nested) in fields {
                    self.traverse(nested, object.get(field), field)?;
                }
                Ok(())
            }
        }
    }
}

fn mismatch(expected: &'static str, event: Option<&Value>, key: &str) -> AnimationError {
    let found = match event {
        None => "missing",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "bool",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    };
    AnimationError::TypeMismatch {
        expected,
        found: found.to_string(),
        context: format!("event key '{key}'"),
    }
}
