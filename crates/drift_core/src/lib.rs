//! Drift Core Runtime
//!
//! This crate provides the foundational primitives for the Drift animation engine:
//!
//! - **Node Graph**: Value, interpolation, pair, transform, style, props, and
//!   tracking nodes stored in one arena
//! - **Two-Phase Flush**: Terminal nodes are collected first, then updated once
//! - **Driver Contract**: The [`Animation`] trait implemented by timing, decay,
//!   and spring drivers
//! - **Scheduling**: The host [`Scheduler`] contract and a deterministic
//!   [`ManualScheduler`]
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use drift_core::{Graph, ManualScheduler, NodeValue, Prop};
//! use indexmap::IndexMap;
//!
//! let graph = Graph::new(Rc::new(ManualScheduler::new()));
//! let opacity = graph.value(0.0);
//!
//! let commits = Rc::new(Cell::new(0));
//! let counter = commits.clone();
//! let mut style = IndexMap::new();
//! style.insert("opacity".to_string(), Prop::Node(opacity));
//! let props = graph
//!     .props(style, Rc::new(move || counter.set(counter.get() + 1)))
//!     .unwrap();
//!
//! graph.set_value(opacity, 0.5).unwrap();
//! assert_eq!(commits.get(), 1);
//! assert_eq!(
//!     graph.get_value(props).unwrap().get("opacity"),
//!     Some(&NodeValue::Number(0.5))
//! );
//! ```

pub mod animation;
pub mod error;
pub mod graph;
pub mod listener;
pub mod scheduler;
pub mod value;

pub use animation::{
    Animation, AnimationResult, AnimationStart, Completion, CompletionSlot, MotionState, UpdateFn,
};
pub use error::{AnimationError, Result};
pub use graph::{
    AnimationFactory, CommitFn, Graph, Mapping, NodeId, Prop, TransformArg, TransformEntry,
};
pub use listener::{Listener, ListenerId};
pub use scheduler::{FrameHandle, ManualScheduler, Scheduler, Task, TimerHandle};
pub use value::{format_number, NodeValue};
