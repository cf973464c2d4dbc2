//! Delayed callbacks behind a small trait so the recognizer never touches a
//! concrete event loop.
//!
//! Every scheduled task is paired with a [`CancellationToken`]; cancelling the
//! token drops the task for good instead of letting it run and be ignored.

mod manual;
mod runtime;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Runs `task` once `delay` has elapsed unless the returned token is
    /// cancelled first. A zero delay runs as soon as the scheduler gets to it.
    fn schedule(&self, delay: Duration, task: Task) -> CancellationToken;
}
