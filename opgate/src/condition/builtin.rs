//! Generic conditions that only look at the task graph itself.
use crate::condition::{Completion, Condition, ConditionResult};
use crate::task::{FailureReason, Task, TaskError};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Fails when any dependency finished with errors.
///
/// The failure wraps every error of every failed dependency, so the dependent
/// finishes carrying the full chain of what went wrong upstream. Without it a
/// task happily runs after its dependencies failed: the state machine only
/// cares that they *finished*.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFailedDependencies;

impl Condition for NoFailedDependencies {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("NoFailedDependencies")
    }

    fn evaluate(&self, task: &Task, completion: Completion) {
        let upstream = task
            .dependencies()
            .iter()
            .flat_map(|dep| dep.errors())
            .collect::<Vec<_>>();

        if upstream.is_empty() {
            completion.satisfied();
        } else {
            completion.failed(FailureReason::DependenciesFailed(upstream));
        }
    }
}

/// Fails when any dependency was cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCancelledDependencies;

impl Condition for NoCancelledDependencies {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("NoCancelledDependencies")
    }

    fn evaluate(&self, task: &Task, completion: Completion) {
        let cancelled = task
            .dependencies()
            .iter()
            .filter(|dep| dep.is_cancelled())
            .map(Task::id)
            .collect::<Vec<_>>();

        if cancelled.is_empty() {
            completion.satisfied();
        } else {
            completion.failed(FailureReason::DependenciesCancelled(cancelled));
        }
    }
}

/// Evaluates the wrapped condition without contributing its dependency.
///
/// Useful when the dependency would have side effects (prompting, fetching)
/// and the caller only wants to know whether the condition already holds.
#[derive(Debug, Clone)]
pub struct Silent<C> {
    inner: C,
}

impl<C: Condition> Silent<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Condition> Condition for Silent<C> {
    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("Silent<{}>", self.inner.name()))
    }

    fn is_mutually_exclusive(&self) -> bool {
        self.inner.is_mutually_exclusive()
    }

    fn evaluate(&self, task: &Task, completion: Completion) {
        self.inner.evaluate(task, completion);
    }
}

/// Satisfied iff the wrapped condition fails.
#[derive(Debug, Clone)]
pub struct Negated<C> {
    inner: C,
}

impl<C: Condition> Negated<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Condition> Condition for Negated<C> {
    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("Not<{}>", self.inner.name()))
    }

    fn is_mutually_exclusive(&self) -> bool {
        self.inner.is_mutually_exclusive()
    }

    fn dependency_for(&self, task: &Task) -> Option<Task> {
        self.inner.dependency_for(task)
    }

    fn evaluate(&self, task: &Task, completion: Completion) {
        // The inner verdict is translated through a second completion, so the
        // outer one reports under the negated name.
        let inner = Completion::new(self.inner.name(), move |result| match result {
            ConditionResult::Satisfied => completion.failed(FailureReason::NegatedSatisfied),
            // A missing verdict is not a failure to negate.
            ConditionResult::Failed(TaskError::ConditionFailed {
                reason: FailureReason::NoVerdict,
                ..
            }) => completion.failed(FailureReason::NoVerdict),
            ConditionResult::Failed(_) => completion.satisfied(),
        });

        self.inner.evaluate(task, inner);
    }
}

type Predicate = Arc<dyn Fn(&Task) -> Result<(), String> + Send + Sync + 'static>;

/// Condition backed by a synchronous closure.
#[derive(Clone)]
pub struct BlockCondition {
    name: Cow<'static, str>,
    predicate: Predicate,
}

impl BlockCondition {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, predicate: F) -> Self
    where
        F: Fn(&Task) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl Condition for BlockCondition {
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn evaluate(&self, task: &Task, completion: Completion) {
        match (self.predicate)(task) {
            Ok(()) => completion.satisfied(),
            Err(msg) => completion.failed(FailureReason::Unsatisfied(msg)),
        }
    }
}

impl fmt::Debug for BlockCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCondition")
            .field("name", &self.name)
            .finish()
    }
}

/// Marks a task as belonging to an exclusivity category.
///
/// Always satisfied. Its only purpose is to carry `is_mutually_exclusive`
/// under a category name so the host scheduler can serialize tasks of the
/// same category.
#[derive(Debug, Clone)]
pub struct MutuallyExclusive {
    category: Cow<'static, str>,
}

impl MutuallyExclusive {
    pub fn new(category: impl Into<Cow<'static, str>>) -> Self {
        Self {
            category: category.into(),
        }
    }
}

impl Condition for MutuallyExclusive {
    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("MutuallyExclusive<{}>", self.category))
    }

    fn is_mutually_exclusive(&self) -> bool {
        true
    }

    fn evaluate(&self, _task: &Task, completion: Completion) {
        completion.satisfied();
    }
}

// Lets shared conditions, `Arc<dyn Condition>` included, be wrapped by the
// generic combinators.
impl<C: Condition + ?Sized> Condition for Arc<C> {
    fn name(&self) -> Cow<'static, str> {
        (**self).name()
    }

    fn is_mutually_exclusive(&self) -> bool {
        (**self).is_mutually_exclusive()
    }

    fn dependency_for(&self, task: &Task) -> Option<Task> {
        (**self).dependency_for(task)
    }

    fn evaluate(&self, task: &Task, completion: Completion) {
        (**self).evaluate(task, completion)
    }
}
