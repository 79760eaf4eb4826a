use crate::condition::{BlockCondition, Completion, Condition, ConditionResult};
use crate::sync::AtomicCell;
use crate::task::{FailureReason, Task};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::Arc;

/// Condition with a verdict known upfront.
pub(crate) fn fixed_condition(name: impl Into<Cow<'static, str>>, pass: bool) -> Arc<dyn Condition> {
    Arc::new(BlockCondition::new(name, move |_: &Task| {
        if pass {
            Ok(())
        } else {
            Err("fixed failure".to_string())
        }
    }))
}

/// Always satisfied, counts how many times it was evaluated.
pub(crate) fn counting_condition(
    name: impl Into<Cow<'static, str>>,
) -> (Arc<dyn Condition>, Arc<AtomicCell<usize>>) {
    let calls = Arc::new(AtomicCell::new(0));
    let counter = Arc::clone(&calls);

    let condition = BlockCondition::new(name, move |_: &Task| {
        counter.update(|n| *n += 1);
        Ok(())
    });

    (Arc::new(condition), calls)
}

/// Holds back the verdict of a [`GatedCondition`] until released.
#[derive(Debug, Clone)]
pub(crate) struct Gate {
    completion: Arc<Mutex<Option<Completion>>>,
}

impl Gate {
    pub(crate) fn is_pending(&self) -> bool {
        self.completion.lock().is_some()
    }

    pub(crate) fn release(&self, result: ConditionResult) {
        // Taken out first: the verdict may run the whole task.
        let completion = self.completion.lock().take();
        match completion {
            Some(completion) => completion.complete(result),
            None => panic!("gate released before the condition was evaluated"),
        }
    }

    pub(crate) fn fail(&self, reason: FailureReason) {
        let completion = self.completion.lock().take();
        match completion {
            Some(completion) => completion.failed(reason),
            None => panic!("gate failed before the condition was evaluated"),
        }
    }
}

/// Condition that parks its completion, so the test decides when and from
/// which thread the verdict arrives.
#[derive(Debug)]
pub(crate) struct GatedCondition {
    name: &'static str,
    gate: Gate,
}

impl GatedCondition {
    pub(crate) fn new(name: &'static str) -> (Gate, Arc<dyn Condition>) {
        let gate = Gate {
            completion: Arc::new(Mutex::new(None)),
        };
        let condition = Self {
            name,
            gate: gate.clone(),
        };
        (gate, Arc::new(condition))
    }
}

impl Condition for GatedCondition {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(self.name)
    }

    fn evaluate(&self, _task: &Task, completion: Completion) {
        *self.gate.completion.lock() = Some(completion);
    }
}

/// Always satisfied, contributes `dependency`.
#[derive(Debug)]
pub(crate) struct DependencyCondition {
    name: &'static str,
    dependency: Task,
}

impl DependencyCondition {
    pub(crate) fn new(name: &'static str, dependency: Task) -> Self {
        Self { name, dependency }
    }
}

impl Condition for DependencyCondition {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(self.name)
    }

    fn dependency_for(&self, _task: &Task) -> Option<Task> {
        Some(self.dependency.clone())
    }

    fn evaluate(&self, _task: &Task, completion: Completion) {
        completion.satisfied();
    }
}
