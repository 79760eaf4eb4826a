//! The task state machine.
//!
//! ```text
//! Initial --mark_enqueued--> Enqueued --(deps finished)--> ready
//! ready --start, cancelled--> Finished
//! ready --start, conditions fail--> cancelled(errors) --> Finished
//! ready --start, conditions pass--> Executing --finish--> Finished
//! Executing --cancel--> Executing (flag set, must still finish itself)
//! ```
//!
//! A [`Task`] is a shared handle. The creator configures it (conditions,
//! observers, dependencies), the host scheduler takes it over through
//! [`mark_enqueued`](Task::mark_enqueued) and later calls
//! [`start`](Task::start) once. From there the task evaluates its conditions,
//! runs its [`Execute`] strategy, and the strategy eventually calls
//! [`finish`](Task::finish). Each configuration window closes for good at a
//! specific transition, after which the corresponding set is only ever read.
use crate::condition::{Condition, ConditionEvaluator};
use crate::host::Schedule;
use crate::observer::{Event, Observer};
use crate::sync::AtomicCell;
use parking_lot::{Mutex, MutexGuard, RwLock};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

mod builder;
pub use self::builder::TaskBuilder;

mod error;
pub use self::error::{FailureReason, TaskError, UsageError};

mod id;
pub use self::id::Id;

mod state;
pub(crate) use self::state::Flags;
pub use self::state::TaskState;


// Conditions and observers per task rarely go past a handful.
pub(crate) const INLINE_ENTRIES: usize = 4;

/// Execution strategy of a task.
///
/// `execute` is called at most once, on the thread that delivered the last
/// condition verdict. It may return long before the work is done, but the
/// work must eventually call [`Task::finish`] or the task never finishes.
/// Closures taking `&Task` implement this trait.
pub trait Execute: Send + Sync + 'static {
    fn execute(&self, task: &Task);
}

impl<F> Execute for F
where
    F: Fn(&Task) + Send + Sync + 'static,
{
    fn execute(&self, task: &Task) {
        self(task)
    }
}

pub(crate) type FinishHook = Box<dyn FnOnce(&Task, &[TaskError]) + Send + 'static>;

type Entries<T> = SmallVec<[T; INLINE_ENTRIES]>;

/// Work queued behind a transition, run in order by `Task::drain`.
enum Step {
    Notify(Event),

    /// Deliver `DidStart`, then enter `EXECUTING` unless finishing already.
    Start,

    /// Run the finish hook, deliver `DidFinish`, then set `FINISHED`.
    Finish(Vec<TaskError>),
}

#[derive(Default)]
struct Dispatch {
    queue: VecDeque<Step>,
    // Some thread is draining `queue`.
    active: bool,
}

struct Inner {
    id: Id,

    name: Option<Cow<'static, str>>,

    // Every lifecycle flag lives in this one cell. See `Flags`.
    flags: AtomicCell<Flags>,

    // Append-only.
    errors: AtomicCell<Vec<TaskError>>,

    // Frozen once EVALUATING is set.
    conditions: RwLock<Entries<Arc<dyn Condition>>>,

    // Frozen once EXECUTING or FINISHING is set.
    observers: RwLock<Entries<Arc<dyn Observer>>>,

    // Frozen once ENQUEUED is set.
    dependencies: RwLock<Vec<Task>>,

    body: Option<Box<dyn Execute>>,

    on_finish: Mutex<Option<FinishHook>>,

    // Set by `host::handoff`, taken when the task finishes so the task never
    // keeps its scheduler alive past that point.
    host: Mutex<Option<Arc<dyn Schedule>>>,

    // Transitions that notify observers happen under this lock and queue their
    // step before releasing it. Never held while an observer runs.
    dispatch: Mutex<Dispatch>,
}

/// Handle to a unit of work. Cloning is cheap and yields the same task.
#[derive(Clone)]
pub struct Task {
    inner: Arc<Inner>,
}

/// Non-owning handle, see [`Task::downgrade`].
#[derive(Clone)]
pub struct WeakTask {
    inner: Weak<Inner>,
}

impl WeakTask {
    pub fn upgrade(&self) -> Option<Task> {
        self.inner.upgrade().map(|inner| Task { inner })
    }
}

impl Task {
    /// Creates a task running `body` once its conditions pass.
    pub fn new(body: impl Execute) -> Self {
        TaskBuilder::default().build(body)
    }

    /// Creates a task without an execution strategy. It finishes as soon as it
    /// starts.
    pub fn noop() -> Self {
        TaskBuilder::default().build_noop()
    }

    pub fn builder() -> TaskBuilder {
        TaskBuilder::default()
    }

    pub fn id(&self) -> Id {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn downgrade(&self) -> WeakTask {
        WeakTask {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn state(&self) -> TaskState {
        self.inner.flags.get().state()
    }

    /// Enqueued, not started yet, and every dependency finished.
    pub fn is_ready(&self) -> bool {
        let flags = self.inner.flags.get();
        flags.contains(Flags::ENQUEUED) && !flags.is_started() && self.dependencies_finished()
    }

    pub fn is_executing(&self) -> bool {
        self.inner.flags.get().contains(Flags::EXECUTING)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.flags.get().contains(Flags::FINISHED)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flags.get().contains(Flags::CANCELLED)
    }

    /// Errors accumulated so far, in the order they were reported.
    pub fn errors(&self) -> Vec<TaskError> {
        self.inner.errors.get()
    }

    pub fn dependencies(&self) -> Vec<Task> {
        self.inner.dependencies.read().clone()
    }

    pub fn conditions(&self) -> Vec<Arc<dyn Condition>> {
        self.inner.conditions.read().to_vec()
    }

    fn dependencies_finished(&self) -> bool {
        self.inner.dependencies.read().iter().all(Task::is_finished)
    }

    /// Fails once condition evaluation has started.
    pub fn add_condition(&self, condition: impl Condition) -> Result<(), UsageError> {
        let mut conditions = self.inner.conditions.write();
        if self.inner.flags.get().is_started() {
            return Err(self.misuse(UsageError::ConditionsFrozen(self.id())));
        }

        conditions.push(Arc::new(condition));
        Ok(())
    }

    /// Fails once the task is executing or finished.
    pub fn add_observer(&self, observer: impl Observer) -> Result<(), UsageError> {
        let mut observers = self.inner.observers.write();
        if self
            .inner
            .flags
            .get()
            .intersects(Flags::EXECUTING | Flags::FINISHING | Flags::FINISHED)
        {
            return Err(self.misuse(UsageError::ObserversFrozen(self.id())));
        }

        observers.push(Arc::new(observer));
        Ok(())
    }

    /// Fails once the task is enqueued. Adding the same dependency twice is a
    /// no-op.
    pub fn add_dependency(&self, dependency: Task) -> Result<(), UsageError> {
        if dependency == *self {
            return Err(self.misuse(UsageError::SelfDependency(self.id())));
        }

        let mut dependencies = self.inner.dependencies.write();
        if self.inner.flags.get().contains(Flags::ENQUEUED) {
            return Err(self.misuse(UsageError::DependenciesFrozen(self.id())));
        }

        if !dependencies.contains(&dependency) {
            dependencies.push(dependency);
        }
        Ok(())
    }

    /// Returns whether `dependency` was a dependency. Same window as
    /// [`add_dependency`](Self::add_dependency).
    pub fn remove_dependency(&self, dependency: &Task) -> Result<bool, UsageError> {
        let mut dependencies = self.inner.dependencies.write();
        if self.inner.flags.get().contains(Flags::ENQUEUED) {
            return Err(self.misuse(UsageError::DependenciesFrozen(self.id())));
        }

        let before = dependencies.len();
        dependencies.retain(|dep| dep != dependency);
        Ok(dependencies.len() != before)
    }

    /// Hands the task to its host scheduler. From here on the task is ready
    /// as soon as all its dependencies are finished.
    ///
    /// Fails on a task that already finished: it could never become ready.
    pub fn mark_enqueued(&self) -> Result<(), UsageError> {
        // Held so a racing `add_dependency` either lands before the flag or
        // sees it.
        let _dependencies = self.inner.dependencies.write();

        let id = self.id();
        self.inner
            .flags
            .update(|flags| {
                if flags.contains(Flags::ENQUEUED) {
                    Err(UsageError::AlreadyEnqueued(id))
                } else if flags.is_finishing() {
                    Err(UsageError::AlreadyFinished(id))
                } else {
                    flags.insert(Flags::ENQUEUED);
                    Ok(())
                }
            })
            .map_err(|err| self.misuse(err))?;

        tracing::trace!(task = %self, "enqueued");
        Ok(())
    }

    pub(crate) fn bind_host(&self, host: Arc<dyn Schedule>) {
        *self.inner.host.lock() = Some(host);
    }

    /// Entry point for the host scheduler. Must be called once, after
    /// [`is_ready`](Self::is_ready) turned true.
    ///
    /// Returns as soon as the conditions are dispatched: evaluation and
    /// execution may continue on other threads.
    pub fn start(&self) -> Result<(), UsageError> {
        let id = self.id();
        let dependencies_finished = self.dependencies_finished();

        let cancelled = self
            .inner
            .flags
            .update(|flags| {
                if flags.is_started() {
                    return Err(UsageError::AlreadyStarted(id));
                }
                if !flags.contains(Flags::ENQUEUED) || !dependencies_finished {
                    return Err(UsageError::NotReady(id));
                }

                flags.insert(Flags::EVALUATING);
                Ok(flags.contains(Flags::CANCELLED))
            })
            .map_err(|err| self.misuse(err))?;

        if cancelled {
            tracing::debug!(task = %self, "cancelled before start, finishing");
            self.finish(Vec::new());
            return Ok(());
        }

        tracing::trace!(task = %self, "evaluating conditions");

        let task = self.clone();
        ConditionEvaluator::evaluate(&self.conditions(), self, move |errors| {
            task.conditions_evaluated(errors);
        });

        Ok(())
    }

    fn conditions_evaluated(&self, errors: Vec<TaskError>) {
        if !errors.is_empty() {
            tracing::debug!(task = %self, failed = errors.len(), "conditions failed");
            self.cancel_with_errors(errors);
            self.finish(Vec::new());
            return;
        }

        let dispatch = self.inner.dispatch.lock();

        let flags = self.inner.flags.get();
        if flags.is_finishing() {
            return;
        }
        if flags.contains(Flags::CANCELLED) {
            drop(dispatch);
            tracing::debug!(task = %self, "cancelled during evaluation, finishing");
            self.finish(Vec::new());
            return;
        }

        self.push(dispatch, Step::Start);
    }

    /// Flags the task as cancelled and notifies observers, the first time
    /// only. Has no effect once the task is finishing.
    ///
    /// Cancellation is advisory: a task that is already executing keeps
    /// running until its own logic notices and calls [`finish`](Self::finish).
    pub fn cancel(&self) {
        let dispatch = self.inner.dispatch.lock();
        self.cancel_locked(dispatch);
    }

    /// Appends `errors` then cancels. Ignored once the task is finishing.
    pub fn cancel_with_errors(&self, errors: impl IntoIterator<Item = TaskError>) {
        let dispatch = self.inner.dispatch.lock();

        if self.inner.flags.get().is_finishing() {
            drop(dispatch);
            tracing::debug!(task = %self, "already finished, dropping cancellation errors");
            return;
        }

        self.inner.errors.update(|acc| acc.extend(errors));
        self.cancel_locked(dispatch);
    }

    pub fn cancel_with_error(&self, error: TaskError) {
        self.cancel_with_errors([error]);
    }

    fn cancel_locked(&self, dispatch: MutexGuard<'_, Dispatch>) {
        let first = self.inner.flags.update(|flags| {
            if flags.is_finishing() || flags.contains(Flags::CANCELLED) {
                false
            } else {
                flags.insert(Flags::CANCELLED);
                true
            }
        });

        if first {
            tracing::debug!(task = %self, "cancelled");
            self.push(dispatch, Step::Notify(Event::DidCancel));
        }
    }

    /// Announces `task` to observers as new work discovered while running.
    ///
    /// This is a side channel to the host scheduler (see
    /// [`ProduceForwarder`](crate::observer::ProduceForwarder)): the produced
    /// task is not a dependency of this one and is not owned by it. Only an
    /// executing task that has not started finishing can produce.
    pub fn produce(&self, task: Task) -> Result<(), UsageError> {
        let dispatch = self.inner.dispatch.lock();

        let flags = self.inner.flags.get();
        if !flags.contains(Flags::EXECUTING) || flags.is_finishing() {
            drop(dispatch);
            return Err(self.misuse(UsageError::NotExecuting(self.id())));
        }

        tracing::trace!(task = %self, produced = %task, "produced");
        self.push(dispatch, Step::Notify(Event::DidProduce(task)));
        Ok(())
    }

    /// Completes the task with `errors` appended to the accumulated ones.
    ///
    /// Runs the finish hook, notifies `DidFinish` with every accumulated error,
    /// then clears `executing` and sets `finished` in one step. Only the first
    /// call counts, later ones are logged and ignored.
    ///
    /// When another thread is delivering events for this task, the call
    /// returns right away and that thread completes the finish.
    pub fn finish(&self, errors: Vec<TaskError>) {
        let dispatch = self.inner.dispatch.lock();

        let claimed = self.inner.flags.update(|flags| {
            if flags.is_finishing() {
                false
            } else {
                flags.insert(Flags::FINISHING);
                true
            }
        });

        if !claimed {
            drop(dispatch);
            tracing::warn!(task = %self, "finish called more than once, ignoring");
            return;
        }

        let accumulated = self.inner.errors.modify(|mut acc| {
            acc.extend(errors);
            acc
        });

        self.push(dispatch, Step::Finish(accumulated));
    }

    pub fn finish_with_error(&self, error: Option<TaskError>) {
        self.finish(error.into_iter().collect());
    }

    /// Blocking on a task is not supported.
    ///
    /// Tasks are cooperatively scheduled: a synchronous wait from a scheduler
    /// thread can starve the very task it waits on. Declare a dependency or
    /// observe `DidFinish` instead.
    ///
    /// # Panics
    ///
    /// Always.
    pub fn wait_until_finished(&self) {
        self.blocking_wait_unsupported()
    }

    #[cold]
    fn blocking_wait_unsupported(&self) -> ! {
        panic!("task {self}: blocking wait is unsupported, use a dependency or an observer")
    }

    fn misuse(&self, err: UsageError) -> UsageError {
        tracing::warn!(task = %self, %err, "task misuse");
        err
    }

    /// Queues `step` behind the transition made under `dispatch`, then drains
    /// the queue unless another call is already draining it.
    ///
    /// Queueing under the same lock as the transition keeps steps in state
    /// machine order. A nested call from inside an observer, or a concurrent
    /// one from another thread, only queues: the draining thread picks it up
    /// once the current step reached every observer.
    fn push(&self, mut dispatch: MutexGuard<'_, Dispatch>, step: Step) {
        dispatch.queue.push_back(step);
        if dispatch.active {
            return;
        }

        dispatch.active = true;
        drop(dispatch);
        self.drain();
    }

    fn drain(&self) {
        let mut execute = false;
        let mut finished = false;

        loop {
            let step = {
                let mut dispatch = self.inner.dispatch.lock();
                match dispatch.queue.pop_front() {
                    Some(step) => step,
                    None => {
                        dispatch.active = false;
                        break;
                    }
                }
            };

            match step {
                Step::Notify(event) => self.deliver(&event),
                Step::Start => {
                    self.deliver(&Event::DidStart);

                    // An observer may have finished the task from `did_start`.
                    execute = self.inner.flags.update(|flags| {
                        if flags.is_finishing() {
                            false
                        } else {
                            flags.insert(Flags::EXECUTING);
                            true
                        }
                    });
                }
                Step::Finish(errors) => {
                    self.run_finish_hook(&errors);

                    let count = errors.len();
                    self.deliver(&Event::DidFinish(errors));

                    self.inner.flags.update(|flags| {
                        flags.remove(Flags::EXECUTING | Flags::FINISHING);
                        flags.insert(Flags::FINISHED);
                    });
                    tracing::trace!(task = %self, errors = count, "finished");
                    finished = true;
                    execute = false;
                }
            }
        }

        if finished {
            let host = self.inner.host.lock().take();
            if let Some(host) = host {
                host.release(self);
            }
        }

        if execute {
            tracing::trace!(task = %self, "executing");
            match &self.inner.body {
                Some(body) => body.execute(self),
                None => self.finish(Vec::new()),
            }
        }
    }

    fn run_finish_hook(&self, errors: &[TaskError]) {
        let Some(hook) = self.inner.on_finish.lock().take() else {
            return;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook(self, errors))) {
            tracing::warn!(
                task = %self,
                panic = error::panic_payload_as_str(payload.as_ref()),
                "finish hook panicked"
            );
        }
    }

    /// Hands `event` to every observer. A panicking observer is logged and
    /// skipped, the others still get the event.
    fn deliver(&self, event: &Event) {
        let observers = self.inner.observers.read().clone();

        for observer in &observers {
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| event.dispatch(observer.as_ref(), self)));

            if let Err(payload) = delivered {
                tracing::warn!(
                    task = %self,
                    event = ?event.kind(),
                    panic = error::panic_payload_as_str(payload.as_ref()),
                    "observer panicked"
                );
            }
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}#{}", self.id()),
            None => write!(f, "#{}", self.id()),
        }
    }
}

// Skip dependencies to avoid printing the whole graph.
impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl fmt::Debug for WeakTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakTask").finish_non_exhaustive()
    }
}
