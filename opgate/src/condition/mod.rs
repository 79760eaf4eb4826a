//! Preconditions gating the execution of a task.
//!
//! A [`Condition`] is evaluated once, right after the host scheduler calls
//! [`Task::start`]. All conditions of a task are dispatched together and each
//! one reports its verdict through a [`Completion`], possibly from another
//! thread and possibly long after `evaluate` returned. The
//! [`ConditionEvaluator`] joins the verdicts without blocking anyone.
//!
//! A condition can also contribute a dependency through
//! [`Condition::dependency_for`]. Those are wired in by
//! [`handoff`](crate::host::handoff) before the task is enqueued, never during
//! evaluation: by then the dependency set is frozen.
//!
//! [`Task::start`]: crate::task::Task::start
use crate::task::{FailureReason, Task, TaskError};
use std::borrow::Cow;
use std::fmt;

pub mod builtin;
pub use self::builtin::{
    BlockCondition, MutuallyExclusive, Negated, NoCancelledDependencies, NoFailedDependencies,
    Silent,
};

mod evaluator;
pub use self::evaluator::ConditionEvaluator;

/// Precondition contract.
pub trait Condition: Send + Sync + 'static {
    /// Name reported in [`TaskError::ConditionFailed`].
    fn name(&self) -> Cow<'static, str>;

    /// Whether two tasks carrying a condition of this name must never run
    /// concurrently. Enforcing it is up to the host scheduler.
    fn is_mutually_exclusive(&self) -> bool {
        false
    }

    /// An extra task that must finish before `task` may start.
    fn dependency_for(&self, _task: &Task) -> Option<Task> {
        None
    }

    /// Checks the condition and reports exactly one verdict on `completion`.
    ///
    /// May read the task's state, must never mutate it. The verdict can be
    /// delivered from any thread, after this method returned.
    fn evaluate(&self, task: &Task, completion: Completion);
}

#[derive(Debug, Clone)]
pub enum ConditionResult {
    Satisfied,
    Failed(TaskError),
}

impl ConditionResult {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, ConditionResult::Satisfied)
    }

    pub fn into_error(self) -> Option<TaskError> {
        match self {
            ConditionResult::Satisfied => None,
            ConditionResult::Failed(err) => Some(err),
        }
    }
}

impl From<TaskError> for ConditionResult {
    fn from(err: TaskError) -> Self {
        ConditionResult::Failed(err)
    }
}

type Callback = Box<dyn FnOnce(ConditionResult) + Send + 'static>;

/// One-shot handle through which a condition reports its verdict.
///
/// Every reporting method consumes the handle, so a verdict is delivered at
/// most once. Dropping the handle without reporting counts as a failure with
/// [`FailureReason::NoVerdict`], which keeps a buggy condition from stalling
/// the task forever.
pub struct Completion {
    condition: Cow<'static, str>,
    callback: Option<Callback>,
}

impl Completion {
    pub(crate) fn new<F>(condition: Cow<'static, str>, callback: F) -> Self
    where
        F: FnOnce(ConditionResult) + Send + 'static,
    {
        Self {
            condition,
            callback: Some(Box::new(callback)),
        }
    }

    /// Name of the condition this handle reports for.
    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn satisfied(self) {
        self.complete(ConditionResult::Satisfied);
    }

    /// Reports a failure, tagging it with the condition name.
    pub fn failed(self, reason: FailureReason) {
        let err = TaskError::condition_failed(self.condition.clone(), reason);
        self.complete(ConditionResult::Failed(err));
    }

    pub fn complete(mut self, result: ConditionResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            tracing::warn!(
                condition = %self.condition,
                "condition dropped its completion without a verdict"
            );

            callback(ConditionResult::Failed(TaskError::condition_failed(
                self.condition.clone(),
                FailureReason::NoVerdict,
            )));
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("condition", &self.condition)
            .field("pending", &self.callback.is_some())
            .finish()
    }
}
