use crate::observer::Observer;
use crate::task::Task;
use anyhow::Result;

// Exports
pub(crate) mod conditions;
pub(crate) use conditions::{
    DependencyCondition, GatedCondition, counting_condition, fixed_condition,
};

pub(crate) mod mocks;
pub(crate) use mocks::{InlineScheduler, ThreadedScheduler};

pub(crate) mod spy;
pub(crate) use spy::{Call, Method, SpyObserver, SpyScheduler};

/// Enqueues and starts `task` on the calling thread, without a host.
pub(crate) fn run_inline(task: &Task) -> Result<()> {
    task.mark_enqueued()?;
    task.start()?;
    Ok(())
}

/// Stands in for a task body that checks for cancellation and wraps up.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FinishOnCancel;

impl Observer for FinishOnCancel {
    fn did_cancel(&self, task: &Task) {
        if task.is_executing() {
            task.finish(Vec::new());
        }
    }
}
