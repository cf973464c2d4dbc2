use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{Scheduler, Task};

/// Virtual-clock scheduler. Nothing runs until the clock is moved with
/// [`advance`](Self::advance) or [`advance_to`](Self::advance_to).
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    queue: Vec<Entry>,
}

struct Entry {
    due: Duration,
    seq: u64,
    token: CancellationToken,
    task: Task,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Scheduled tasks that are neither cancelled nor run yet.
    pub fn pending(&self) -> usize {
        self.lock()
            .queue
            .iter()
            .filter(|entry| !entry.token.is_cancelled())
            .count()
    }

    /// Due time of the earliest live task.
    pub fn next_due(&self) -> Option<Duration> {
        self.lock()
            .queue
            .iter()
            .filter(|entry| !entry.token.is_cancelled())
            .map(|entry| entry.due)
            .min()
    }

    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now().saturating_add(by);
        self.advance_to(target)
    }

    /// Moves the clock to `target`, running every live task due on the way
    /// in due order. Returns the number of tasks run. The clock never goes
    /// backwards.
    pub fn advance_to(&self, target: Duration) -> usize {
        let mut ran = 0;
        loop {
            let entry = {
                let mut state = self.lock();
                state.queue.retain(|entry| !entry.token.is_cancelled());

                let next = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.due <= target)
                    .min_by_key(|(_, entry)| (entry.due, entry.seq))
                    .map(|(index, _)| index);

                match next {
                    Some(index) => {
                        let entry = state.queue.swap_remove(index);
                        state.now = state.now.max(entry.due);
                        entry
                    }
                    None => {
                        state.now = state.now.max(target);
                        break;
                    }
                }
            };

            // Runs unlocked so the task may schedule or cancel other tasks.
            if !entry.token.is_cancelled() {
                (entry.task)();
                ran += 1;
            }
        }
        ran
    }

    /// Runs whatever is due at the current time, e.g. zero-delay tasks.
    pub fn run_due(&self) -> usize {
        let now = self.now();
        self.advance_to(now)
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> CancellationToken {
        let token = CancellationToken::new();
        let mut state = self.lock();
        let entry = Entry {
            due: state.now.saturating_add(delay),
            seq: state.next_seq,
            token: token.clone(),
            task,
        };
        state.next_seq += 1;
        state.queue.push(entry);
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &'static str| -> Task {
            let sink = sink.clone();
            Box::new(move || sink.lock().unwrap().push(label))
        };
        (log, make)
    }

    #[test]
    fn runs_in_due_order() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();
        scheduler.schedule(Duration::from_millis(30), task("c"));
        scheduler.schedule(Duration::from_millis(10), task("a"));
        scheduler.schedule(Duration::from_millis(10), task("b"));

        assert_eq!(scheduler.advance(Duration::from_millis(20)), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(scheduler.now(), Duration::from_millis(20));

        assert_eq!(scheduler.advance(Duration::from_millis(10)), 1);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn cancelled_tasks_are_dropped() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();
        let token = scheduler.schedule(Duration::from_millis(5), task("x"));
        assert_eq!(scheduler.pending(), 1);
        token.cancel();
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.advance(Duration::from_secs(1)), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn zero_delay_runs_on_run_due() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();
        scheduler.advance_to(Duration::from_millis(7));
        scheduler.schedule(Duration::ZERO, task("now"));
        assert_eq!(scheduler.next_due(), Some(Duration::from_millis(7)));
        assert_eq!(scheduler.run_due(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["now"]);
    }

    #[test]
    fn far_future_delay_saturates() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();
        scheduler.advance_to(Duration::from_millis(5));
        scheduler.schedule(Duration::MAX, task("never"));
        assert_eq!(scheduler.next_due(), Some(Duration::MAX));
        assert_eq!(scheduler.advance(Duration::from_secs(3_600)), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn clock_does_not_go_backwards() {
        let scheduler = ManualScheduler::new();
        scheduler.advance_to(Duration::from_millis(50));
        scheduler.advance_to(Duration::from_millis(10));
        assert_eq!(scheduler.now(), Duration::from_millis(50));
    }
}
