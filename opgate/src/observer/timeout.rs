use crate::observer::Observer;
use crate::task::{Task, TaskError, WeakTask};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

/// Cancels the observed task if it is still unfinished `timeout` after it
/// started, adding [`TaskError::TimedOut`] to its errors.
///
/// Cancellation stays advisory: the task still has to notice and finish on its
/// own. Every timeout in the process shares one timer thread, which only holds
/// weak references to tasks. A task that finishes in time keeps its entry in
/// the timer queue until the deadline passes.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutObserver {
    timeout: Duration,
}

impl TimeoutObserver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Observer for TimeoutObserver {
    fn did_start(&self, task: &Task) {
        timer().arm(Deadline {
            at: Instant::now() + self.timeout,
            seq: 0,
            task: task.downgrade(),
            timeout: self.timeout,
        });
    }
}

static TIMER: OnceLock<Timer> = OnceLock::new();

fn timer() -> &'static Timer {
    TIMER.get_or_init(Timer::default)
}

#[derive(Default)]
struct Timer {
    queue: Mutex<TimerQueue>,
    wakeup: Condvar,
}

#[derive(Default)]
struct TimerQueue {
    deadlines: BinaryHeap<Deadline>,
    // Breaks ties between equal deadlines, first armed fires first.
    seq: u64,
    running: bool,
}

struct Deadline {
    at: Instant,
    seq: u64,
    task: WeakTask,
    timeout: Duration,
}

impl Timer {
    fn arm(&'static self, mut deadline: Deadline) {
        let mut queue = self.queue.lock();

        deadline.seq = queue.seq;
        queue.seq += 1;
        queue.deadlines.push(deadline);

        if !queue.running {
            let spawned = thread::Builder::new()
                .name("opgate-timer".to_string())
                .spawn(move || self.run());

            match spawned {
                Ok(_) => queue.running = true,
                Err(err) => tracing::warn!(%err, "failed to spawn timer thread"),
            }
        }

        self.wakeup.notify_one();
    }

    fn run(&self) {
        let mut queue = self.queue.lock();

        loop {
            let Some(next) = queue.deadlines.peek().map(|d| d.at) else {
                self.wakeup.wait(&mut queue);
                continue;
            };

            if next > Instant::now() {
                self.wakeup.wait_until(&mut queue, next);
                continue;
            }

            if let Some(expired) = queue.deadlines.pop() {
                MutexGuard::unlocked(&mut queue, || expired.fire());
            }
        }
    }
}

impl Deadline {
    fn fire(self) {
        if let Some(task) = self.task.upgrade()
            && !task.is_finished()
        {
            tracing::debug!(task = %task, timeout = ?self.timeout, "timed out, cancelling");
            task.cancel_with_error(TaskError::TimedOut(self.timeout));
        }
    }
}

// Reversed so the max-heap pops the earliest deadline.
impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Deadline {}
