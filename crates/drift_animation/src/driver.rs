//! Bookkeeping shared by the frame-driven drivers

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use drift_core::{
    AnimationResult, AnimationStart, CompletionSlot, FrameHandle, MotionState, Result, Scheduler,
    Task, TimerHandle, UpdateFn,
};

struct Host {
    scheduler: Rc<dyn Scheduler>,
    on_update: UpdateFn,
}

/// Lifecycle of one driver run: active flag, pending frame and timer, and the
/// single-shot completion.
#[derive(Default)]
pub(crate) struct DriverState {
    active: Cell<bool>,
    started: Cell<bool>,
    end: CompletionSlot,
    host: RefCell<Option<Host>>,
    frame: Cell<Option<FrameHandle>>,
    timer: Cell<Option<TimerHandle>>,
}

impl DriverState {
    /// Take ownership of the start parameters. Returns the start value and
    /// the predecessor's motion state.
    pub(crate) fn begin(&self, start: AnimationStart) -> (f64, Option<MotionState>) {
        self.active.set(true);
        self.started.set(true);
        self.end.set(start.on_end);
        *self.host.borrow_mut() = Some(Host {
            scheduler: start.scheduler,
            on_update: start.on_update,
        });
        (start.from, start.previous)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn has_started(&self) -> bool {
        self.started.get()
    }

    fn scheduler(&self) -> Option<Rc<dyn Scheduler>> {
        self.host.borrow().as_ref().map(|host| host.scheduler.clone())
    }

    pub(crate) fn now(&self) -> f64 {
        self.scheduler().map_or(0.0, |scheduler| scheduler.now())
    }

    /// Deliver a value to the node. The update may re-enter and stop this driver.
    pub(crate) fn emit(&self, value: f64) -> Result<()> {
        let on_update = self.host.borrow().as_ref().map(|host| host.on_update.clone());
        match on_update {
            Some(on_update) => on_update(value),
            None => Ok(()),
        }
    }

    /// Schedule `task` on the next frame while the driver is active
    pub(crate) fn request_frame(&self, task: Task) {
        if !self.is_active() {
            return;
        }
        if let Some(scheduler) = self.scheduler() {
            self.frame.set(Some(scheduler.request_frame(task)));
        }
    }

    pub(crate) fn set_timeout(&self, task: Task, delay_ms: f64) {
        if let Some(scheduler) = self.scheduler() {
            self.timer.set(Some(scheduler.set_timeout(task, delay_ms)));
        }
    }

    /// Forget the frame handle once its callback is running
    pub(crate) fn frame_fired(&self) {
        self.frame.set(None);
    }

    pub(crate) fn timer_fired(&self) {
        self.timer.set(None);
    }

    /// End the run with `Completed`
    pub(crate) fn finish(&self) {
        self.active.set(false);
        self.end.fire(AnimationResult::Completed);
    }

    /// Cancel pending callbacks and end the run with `Cancelled`
    pub(crate) fn cancel(&self) {
        self.active.set(false);
        if let Some(scheduler) = self.scheduler() {
            if let Some(frame) = self.frame.take() {
                scheduler.cancel_frame(frame);
            }
            if let Some(timer) = self.timer.take() {
                scheduler.clear_timeout(timer);
            }
        }
        self.end.fire(AnimationResult::Cancelled);
    }
}
