use crate::host::{self, Schedule};
use crate::observer::Observer;
use crate::task::Task;
use std::sync::Arc;

/// Hands every task produced by the observed task over to a host scheduler.
///
/// This is how a host honors [`Task::produce`]: the produced task goes
/// through [`host::handoff`] like any other task and gets its own lifecycle.
/// It is not a dependency of the producer, nor its child.
pub struct ProduceForwarder<S: Schedule> {
    scheduler: Arc<S>,
}

impl<S: Schedule> ProduceForwarder<S> {
    pub fn new(scheduler: Arc<S>) -> Self {
        Self { scheduler }
    }
}

impl<S: Schedule> Observer for ProduceForwarder<S> {
    fn did_produce(&self, task: &Task, produced: &Task) {
        if let Err(err) = host::handoff(produced, &self.scheduler) {
            tracing::warn!(
                task = %task.id(),
                produced = %produced.id(),
                %err,
                "could not hand off produced task"
            );
        }
    }
}

impl<S: Schedule> std::fmt::Debug for ProduceForwarder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProduceForwarder").finish_non_exhaustive()
    }
}
