use crate::task::Id;
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Errors accumulated on a task over its lifetime and delivered to observers
/// when it finishes.
///
/// These are never fatal to the state machine. They are stored verbatim, in
/// the order they were reported, and never deduplicated.
#[derive(thiserror::Error, Debug, Clone)]
pub enum TaskError {
    /// A condition attached to the task did not hold.
    #[error("condition `{condition}` failed: {reason}")]
    ConditionFailed {
        condition: Cow<'static, str>,
        reason: FailureReason,
    },

    /// The task was cancelled by a `TimeoutObserver` after running for too long.
    #[error("task timed out after {0:?}")]
    TimedOut(Duration),

    /// An error reported by the task's own work. Opaque to the state machine.
    #[error("{0}")]
    Execution(Arc<anyhow::Error>),
}

impl TaskError {
    pub fn execution(err: impl Into<anyhow::Error>) -> Self {
        TaskError::Execution(Arc::new(err.into()))
    }

    /// Shorthand for an execution error built from a message.
    pub fn msg(msg: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        TaskError::Execution(Arc::new(anyhow::Error::msg(msg)))
    }

    pub fn condition_failed(condition: impl Into<Cow<'static, str>>, reason: FailureReason) -> Self {
        TaskError::ConditionFailed {
            condition: condition.into(),
            reason,
        }
    }

    /// Name of the failed condition, if this is a condition failure.
    pub fn condition(&self) -> Option<&str> {
        match self {
            TaskError::ConditionFailed { condition, .. } => Some(condition),
            _ => None,
        }
    }

    pub fn is_condition_failure(&self) -> bool {
        matches!(self, TaskError::ConditionFailed { .. })
    }
}

/// Condition specific detail carried by [`TaskError::ConditionFailed`].
#[derive(Debug, Clone)]
pub enum FailureReason {
    /// Free form explanation produced by the condition.
    Unsatisfied(String),

    /// One or more dependencies finished with errors. Wraps every error of
    /// every failed dependency, in dependency order.
    DependenciesFailed(Vec<TaskError>),

    /// One or more dependencies were cancelled.
    DependenciesCancelled(Vec<Id>),

    /// The wrapped condition of a negation was satisfied.
    NegatedSatisfied,

    /// The condition dropped its completion handle without a verdict.
    NoVerdict,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Unsatisfied(msg) => f.write_str(msg),
            FailureReason::DependenciesFailed(errors) => {
                write!(f, "{} dependency error(s)", errors.len())?;
                for err in errors {
                    write!(f, "; {err}")?;
                }
                Ok(())
            }
            FailureReason::DependenciesCancelled(ids) => {
                write!(f, "cancelled dependencies: {ids:?}")
            }
            FailureReason::NegatedSatisfied => f.write_str("negated condition was satisfied"),
            FailureReason::NoVerdict => f.write_str("condition never reported a verdict"),
        }
    }
}

/// Misuse of the task API: mutating configuration after its window closed, or
/// driving the state machine out of order.
///
/// These are programmer errors. They are reported instead of aborting, but
/// there is nothing sensible to do with them at runtime besides fixing the
/// caller.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageError {
    #[error("task {0}: conditions cannot be added once evaluation has started")]
    ConditionsFrozen(Id),

    #[error("task {0}: observers cannot be added once the task is executing or finished")]
    ObserversFrozen(Id),

    #[error("task {0}: dependencies cannot be changed once the task is enqueued")]
    DependenciesFrozen(Id),

    #[error("task {0}: a task cannot depend on itself")]
    SelfDependency(Id),

    #[error("task {0}: already enqueued")]
    AlreadyEnqueued(Id),

    #[error("task {0}: start called before the task was ready")]
    NotReady(Id),

    #[error("task {0}: start called more than once")]
    AlreadyStarted(Id),

    #[error("task {0}: already finished")]
    AlreadyFinished(Id),

    #[error("task {0}: only an executing task can produce work")]
    NotExecuting(Id),
}

/// Best effort rendering of a panic payload for logs.
pub(crate) fn panic_payload_as_str(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "<non-string panic payload>"
    }
}
