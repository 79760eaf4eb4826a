use crate::host::Schedule;
use crate::task::{Id, Task};
use anyhow::{Result, anyhow};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::thread;

// Bounds `run_until_idle` in case a test builds a task graph that never settles.
const MAX_ROUNDS: usize = 1024;

/// Single-threaded host: `schedule` only parks tasks, `run_until_idle` starts
/// every ready one on the calling thread, lowest id first, until none is left.
#[derive(Debug, Default)]
pub(crate) struct InlineScheduler {
    pending: DashMap<Id, Task>,
    started: Mutex<Vec<Id>>,
}

impl InlineScheduler {
    pub(crate) fn run_until_idle(&self) -> Result<()> {
        for _ in 0..MAX_ROUNDS {
            let mut ready = self
                .pending
                .iter()
                .filter(|entry| entry.value().is_ready())
                .map(|entry| *entry.key())
                .collect::<Vec<_>>();

            if ready.is_empty() {
                return Ok(());
            }

            ready.sort();
            for id in ready {
                if let Some((_, task)) = self.pending.remove(&id) {
                    self.started.lock().push(id);
                    task.start()?;
                }
            }
        }

        Err(anyhow!("scheduler did not settle after {MAX_ROUNDS} rounds"))
    }

    /// Ids of started tasks, in start order.
    pub(crate) fn started(&self) -> Vec<Id> {
        self.started.lock().clone()
    }

    /// Tasks scheduled but never started.
    pub(crate) fn num_pending(&self) -> usize {
        self.pending.len()
    }
}

impl Schedule for InlineScheduler {
    fn schedule(&self, task: Task) {
        self.pending.insert(task.id(), task);
    }
}

/// Multi-threaded host: every ready task is started on a fresh thread, as soon
/// as it is scheduled or one of its dependencies is released.
#[derive(Debug, Default)]
pub(crate) struct ThreadedScheduler {
    pending: DashMap<Id, Task>,
}

impl ThreadedScheduler {
    fn start_ready(&self) {
        let ready = self
            .pending
            .iter()
            .filter(|entry| entry.value().is_ready())
            .map(|entry| *entry.key())
            .collect::<Vec<_>>();

        for id in ready {
            // Racing releases may both see it ready, only one removes it.
            if let Some((_, task)) = self.pending.remove(&id) {
                thread::spawn(move || {
                    if let Err(err) = task.start() {
                        panic!("failed to start {task}: {err}");
                    }
                });
            }
        }
    }
}

impl Schedule for ThreadedScheduler {
    fn schedule(&self, task: Task) {
        self.pending.insert(task.id(), task);
        self.start_ready();
    }

    fn release(&self, _task: &Task) {
        self.start_ready();
    }
}
