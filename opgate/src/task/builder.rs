use crate::condition::Condition;
use crate::observer::Observer;
use crate::sync::AtomicCell;
use crate::task::{Dispatch, Entries, Execute, FinishHook, Flags, Id, Inner, Task, TaskError};
use parking_lot::{Mutex, RwLock};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Configures a [`Task`] before handing it out.
///
/// Everything set here can also be added later through the task itself, as
/// long as the matching window is still open. The builder is mostly a
/// convenience for the common case where the full shape of the task is known
/// upfront.
#[derive(Default)]
pub struct TaskBuilder {
    name: Option<Cow<'static, str>>,
    conditions: Entries<Arc<dyn Condition>>,
    observers: Entries<Arc<dyn Observer>>,
    dependencies: Vec<Task>,
    on_finish: Option<FinishHook>,
}

impl TaskBuilder {
    /// Name shown in logs and in `Display`.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn condition(mut self, condition: impl Condition) -> Self {
        self.conditions.push(Arc::new(condition));
        self
    }

    pub fn observer(mut self, observer: impl Observer) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn dependency(mut self, dependency: &Task) -> Self {
        if !self.dependencies.contains(dependency) {
            self.dependencies.push(dependency.clone());
        }
        self
    }

    /// Runs once the task is finishing, before observers hear `DidFinish`.
    pub fn on_finish<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Task, &[TaskError]) + Send + 'static,
    {
        self.on_finish = Some(Box::new(hook));
        self
    }

    pub fn build(self, body: impl Execute) -> Task {
        self.into_task(Some(Box::new(body)))
    }

    /// Builds a task that finishes as soon as its conditions pass.
    pub fn build_noop(self) -> Task {
        self.into_task(None)
    }

    fn into_task(self, body: Option<Box<dyn Execute>>) -> Task {
        let task = Task {
            inner: Arc::new(Inner {
                id: Id::next(),
                name: self.name,
                flags: AtomicCell::new(Flags::empty()),
                errors: AtomicCell::new(Vec::new()),
                conditions: RwLock::new(self.conditions),
                observers: RwLock::new(self.observers),
                dependencies: RwLock::new(self.dependencies),
                body,
                on_finish: Mutex::new(self.on_finish),
                host: Mutex::new(None),
                dispatch: Mutex::new(Dispatch::default()),
            }),
        };

        tracing::trace!(task = %task, "created");
        task
    }
}

impl fmt::Debug for TaskBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBuilder")
            .field("name", &self.name)
            .field("conditions", &self.conditions.len())
            .field("observers", &self.observers.len())
            .field("dependencies", &self.dependencies)
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}
