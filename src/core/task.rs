//! Cooperative, incrementally stepped tasks
//!
//! Long scans (graph rebuilds, fingerprint matching) are written as a
//! [`Task`] whose `step` does one unit of work and returns. The host decides
//! when to call `step` again, so it never blocks for more than one unit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Items processed between releases of transient buffers
pub const RECLAIM_INTERVAL: usize = 2000;

/// Steps between progress redraws in the CLI
pub const PROGRESS_INTERVAL: usize = 100;

/// Result of a single step
#[derive(Debug)]
pub enum Step<T> {
    /// One unit done, more remain
    Yield,
    /// Finished with a result
    Done(T),
    /// Stopped because the cancel token was set
    Cancelled,
}

/// Units processed so far out of the known total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.done as f64 / self.total as f64
        }
    }
}

/// A unit-at-a-time task
pub trait Task {
    type Output;

    /// Do one unit of work
    fn step(&mut self) -> Step<Self::Output>;

    fn progress(&self) -> Progress;
}

/// Shared cancellation flag checked at the start of every step
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a driven task ended
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    Cancelled,
}

/// Drive a task until it finishes, calling `on_tick` after every step
pub fn run_to_completion<T: Task>(
    task: &mut T,
    mut on_tick: impl FnMut(Progress),
) -> TaskOutcome<T::Output> {
    loop {
        let step = task.step();
        on_tick(task.progress());
        match step {
            Step::Yield => continue,
            Step::Done(output) => return TaskOutcome::Completed(output),
            Step::Cancelled => return TaskOutcome::Cancelled,
        }
    }
}
