//! Driver contract
//!
//! A driver is a single-use state machine that produces successive values for
//! one value node. `start` runs at most once, `stop` at most once, and the
//! completion callback fires exactly once: [`AnimationResult::Completed`] when
//! the driver reaches its end, [`AnimationResult::Cancelled`] when it is stopped
//! first.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::scheduler::Scheduler;

/// How a driver or combinator ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationResult {
    /// Ran to its natural end
    Completed,
    /// Stopped before reaching its end
    Cancelled,
}

impl AnimationResult {
    pub fn is_finished(self) -> bool {
        self == AnimationResult::Completed
    }
}

/// Single-shot completion callback
pub type Completion = Box<dyn FnOnce(AnimationResult)>;

/// Receives every value a driver produces
pub type UpdateFn = Rc<dyn Fn(f64) -> Result<()>>;

/// Physical state a driver hands to its successor on the same node.
///
/// Springs read it so re-targeting mid-flight keeps position and velocity
/// continuous.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionState {
    pub position: f64,
    /// Units per second
    pub velocity: f64,
    /// Timestamp of the last integration step, in scheduler milliseconds
    pub time: f64,
}

/// Everything a driver receives when it starts
pub struct AnimationStart {
    /// Stored value of the node at start
    pub from: f64,
    pub scheduler: Rc<dyn Scheduler>,
    pub on_update: UpdateFn,
    pub on_end: Completion,
    /// State of the driver this one replaces, if it could supply one
    pub previous: Option<MotionState>,
}

/// A value-producing driver
pub trait Animation {
    /// Begin producing values. Called at most once.
    fn start(self: Rc<Self>, start: AnimationStart) -> Result<()>;

    /// Cancel the driver. Fires the completion with `Cancelled` unless it
    /// already fired.
    fn stop(&self);

    /// Transferable physical state, for drivers that track one
    fn motion_state(&self) -> Option<MotionState> {
        None
    }
}

/// Holds a completion callback and fires it at most once
#[derive(Default)]
pub struct CompletionSlot {
    callback: RefCell<Option<Completion>>,
}

impl CompletionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, callback: Completion) {
        *self.callback.borrow_mut() = Some(callback);
    }

    /// Fire the callback if it has not fired yet. Returns whether it fired.
    pub fn fire(&self, result: AnimationResult) -> bool {
        // Released before the call so the callback may re-enter the driver.
        let callback = self.callback.borrow_mut().take();
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.callback.borrow().is_some()
    }
}
