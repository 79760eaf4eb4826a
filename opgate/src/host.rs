//! Contract between tasks and the scheduler hosting them.
//!
//! This crate has no scheduler of its own. A host only has to:
//!
//! 1. hand tasks over with [`handoff`], which wires dependencies contributed by
//!    conditions and marks the task enqueued,
//! 2. call [`Task::start`] on a task once [`Task::is_ready`] is true, exactly
//!    once,
//! 3. re-check waiting tasks when [`Schedule::release`] tells it a task
//!    finished.
//!
//! Honoring [`Condition::is_mutually_exclusive`] is also the host's job.
//!
//! [`Condition::is_mutually_exclusive`]: crate::condition::Condition::is_mutually_exclusive
use crate::task::{Task, TaskState, UsageError};
use std::sync::Arc;

/// A host scheduler, as seen from a task.
pub trait Schedule: Send + Sync + 'static {
    /// Takes ownership of an enqueued task. The host starts it once ready.
    fn schedule(&self, task: Task);

    /// Called once `task` finished, outside of its observer notifications.
    ///
    /// Tasks depending on it may have become ready.
    fn release(&self, _task: &Task) {}
}

/// Enqueues `task` on `scheduler`.
///
/// Every dependency contributed by the task's conditions is added to the task
/// first, then handed off to the same scheduler unless something else already
/// enqueued it. The task is scheduled last, after its contributed dependencies.
pub fn handoff<S: Schedule>(task: &Task, scheduler: &Arc<S>) -> Result<(), UsageError> {
    let contributed = task
        .conditions()
        .iter()
        .filter_map(|condition| condition.dependency_for(task))
        .collect::<Vec<_>>();

    for dependency in &contributed {
        task.add_dependency(dependency.clone())?;
    }

    task.mark_enqueued()?;
    task.bind_host(Arc::clone(scheduler) as Arc<dyn Schedule>);

    for dependency in contributed {
        if dependency.state() == TaskState::Initial {
            tracing::trace!(task = %task, dependency = %dependency, "handing off contributed dependency");
            handoff(&dependency, scheduler)?;
        }
    }

    scheduler.schedule(task.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use anyhow::Result;

    #[test]
    fn test_handoff_wires_contributed_dependency() -> Result<()> {
        let scheduler = Arc::new(InlineScheduler::default());
        let prompt = Task::builder().name("prompt").build_noop();

        let task = Task::builder()
            .name("needs-prompt")
            .condition(DependencyCondition::new("prompted", prompt.clone()))
            .build_noop();

        handoff(&task, &scheduler)?;

        assert_eq!(task.dependencies(), vec![prompt.clone()]);
        assert_eq!(prompt.state(), TaskState::Enqueued);
        assert!(!task.is_ready());

        scheduler.run_until_idle()?;

        assert!(task.is_finished());
        assert_eq!(scheduler.started(), vec![prompt.id(), task.id()]);
        Ok(())
    }

    #[test]
    fn test_handoff_twice_is_rejected() -> Result<()> {
        let scheduler = Arc::new(InlineScheduler::default());
        let task = Task::noop();

        handoff(&task, &scheduler)?;
        assert_eq!(
            handoff(&task, &scheduler),
            Err(UsageError::AlreadyEnqueued(task.id()))
        );
        Ok(())
    }

    #[test]
    fn test_shared_contributed_dependency_is_enqueued_once() -> Result<()> {
        let scheduler = Arc::new(InlineScheduler::default());
        let login = Task::builder().name("login").build_noop();

        let first = Task::builder()
            .condition(DependencyCondition::new("logged-in", login.clone()))
            .build_noop();
        let second = Task::builder()
            .condition(DependencyCondition::new("logged-in", login.clone()))
            .build_noop();

        handoff(&first, &scheduler)?;
        handoff(&second, &scheduler)?;
        scheduler.run_until_idle()?;

        assert!(first.is_finished() && second.is_finished());
        let started = scheduler.started();
        assert_eq!(started.iter().filter(|id| **id == login.id()).count(), 1);
        assert_eq!(started[0], login.id());
        Ok(())
    }
}
