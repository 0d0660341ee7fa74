//! Frame and timer scheduling
//!
//! Drivers never block. They re-schedule themselves through a [`Scheduler`]
//! supplied by the host: one callback per display refresh, one-shot delay
//! timers, and a monotonic clock in milliseconds.
//!
//! [`ManualScheduler`] is a deterministic host implementation driven by a
//! virtual clock. Headless runners and tests advance it explicitly.

use std::cell::{Cell, RefCell};

use slotmap::{new_key_type, SlotMap};

use crate::error::{AnimationError, Result};

new_key_type! {
    pub struct FrameHandle;
    pub struct TimerHandle;
}

/// A unit of scheduled work. Errors propagate to whoever pumps the scheduler.
pub type Task = Box<dyn FnOnce() -> Result<()>>;

/// Host scheduling primitives required by the drivers
pub trait Scheduler {
    /// Current monotonic time in milliseconds
    fn now(&self) -> f64;

    /// Run `task` on the next frame
    fn request_frame(&self, task: Task) -> FrameHandle;

    /// Cancel a pending frame callback. Unknown handles are ignored.
    fn cancel_frame(&self, handle: FrameHandle);

    /// Run `task` once after `delay_ms`
    fn set_timeout(&self, task: Task, delay_ms: f64) -> TimerHandle;

    /// Cancel a pending timer. Unknown handles are ignored.
    fn clear_timeout(&self, handle: TimerHandle);
}

struct PendingTimer {
    due: f64,
    seq: u64,
    task: Task,
}

/// Scheduler driven by an explicitly advanced virtual clock
pub struct ManualScheduler {
    now: Cell<f64>,
    frames: RefCell<SlotMap<FrameHandle, (u64, Task)>>,
    timers: RefCell<SlotMap<TimerHandle, PendingTimer>>,
    next_seq: Cell<u64>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    /// Create a scheduler whose clock starts at `now_ms`
    pub fn starting_at(now_ms: f64) -> Self {
        Self {
            now: Cell::new(now_ms),
            frames: RefCell::new(SlotMap::with_key()),
            timers: RefCell::new(SlotMap::with_key()),
            next_seq: Cell::new(0),
        }
    }

    /// Advance the clock by `ms`, firing every timer that falls due on the way.
    ///
    /// Timers fire in due order with the clock set to their due time. A timer
    /// scheduled by another timer during the advance still fires if it falls
    /// due before the end of the window.
    pub fn advance(&self, ms: f64) -> Result<()> {
        let end = self.now.get() + ms.max(0.0);
        let mut first_error = None;

        while let Some(handle) = self.next_due_timer(end) {
            let Some(timer) = self.timers.borrow_mut().remove(handle) else {
                continue;
            };
            if timer.due > self.now.get() {
                self.now.set(timer.due);
            }
            record(&mut first_error, (timer.task)());
        }

        self.now.set(end);
        first_error.map_or(Ok(()), Err)
    }

    /// Run the frame callbacks pending at call time.
    ///
    /// Callbacks requested while the frame runs are deferred to the next frame.
    pub fn run_frame(&self) -> Result<()> {
        let mut tasks: Vec<(u64, Task)> = {
            let mut frames = self.frames.borrow_mut();
            let handles: Vec<FrameHandle> = frames.keys().collect();
            handles
                .into_iter()
                .filter_map(|handle| frames.remove(handle))
                .collect()
        };
        tasks.sort_by_key(|(seq, _)| *seq);

        tracing::trace!(count = tasks.len(), now = self.now.get(), "running frame");

        let mut first_error = None;
        for (_, task) in tasks {
            record(&mut first_error, task());
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Advance the clock by `dt_ms` and run one frame
    pub fn tick(&self, dt_ms: f64) -> Result<()> {
        let advanced = self.advance(dt_ms);
        let frame = self.run_frame();
        advanced.and(frame)
    }

    /// Tick at `frame_ms` intervals until nothing is pending or `max_frames`
    /// frames have run. Returns the number of frames run.
    pub fn run_until_idle(&self, frame_ms: f64, max_frames: usize) -> Result<usize> {
        let mut frames = 0;
        while self.has_pending() && frames < max_frames {
            self.tick(frame_ms)?;
            frames += 1;
        }
        Ok(frames)
    }

    /// Check if any frame callback or timer is pending
    pub fn has_pending(&self) -> bool {
        self.pending_frames() > 0 || self.pending_timers() > 0
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    fn next_seq(&self) -> u64 {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        seq
    }

    fn next_due_timer(&self, end: f64) -> Option<TimerHandle> {
        self.timers
            .borrow()
            .iter()
            .filter(|(_, timer)| timer.due <= end)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)))
            .map(|(handle, _)| handle)
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn request_frame(&self, task: Task) -> FrameHandle {
        let seq = self.next_seq();
        self.frames.borrow_mut().insert((seq, task))
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        self.frames.borrow_mut().remove(handle);
    }

    fn set_timeout(&self, task: Task, delay_ms: f64) -> TimerHandle {
        let seq = self.next_seq();
        self.timers.borrow_mut().insert(PendingTimer {
            due: self.now.get() + delay_ms.max(0.0),
            seq,
            task,
        })
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        self.timers.borrow_mut().remove(handle);
    }
}

/// Keep the first error, log the rest
fn record(first_error: &mut Option<AnimationError>, result: Result<()>) {
    if let Err(err) = result {
        if first_error.is_none() {
            *first_error = Some(err);
        } else {
            tracing::error!(error = %err, "scheduled task failed");
        }
    }
}
