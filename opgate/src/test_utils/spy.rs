use crate::host::Schedule;
use crate::observer::Observer;
use crate::task::{Id, Task, TaskError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Start,
    Produce(Id),
    Cancel,
    Finish(usize),
}

/// Snapshot of the task taken at the time an event was delivered.
#[derive(Debug, Clone)]
pub(crate) struct Seen {
    pub call: Call,
    pub executing: bool,
    pub finished: bool,
    pub errors: Vec<TaskError>,
}

/// Records every event it observes, and flags overlapping deliveries.
#[derive(Debug, Default)]
pub(crate) struct SpyObserver {
    seen: RwLock<Vec<Seen>>,
    in_callback: AtomicBool,
    overlapped: AtomicBool,
}

impl SpyObserver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, task: &Task, call: Call, errors: &[TaskError]) {
        if self.in_callback.swap(true, Ordering::AcqRel) {
            self.overlapped.store(true, Ordering::Release);
        }

        self.seen.write().push(Seen {
            call,
            executing: task.is_executing(),
            finished: task.is_finished(),
            errors: errors.to_vec(),
        });

        self.in_callback.store(false, Ordering::Release);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.seen.read().iter().map(|seen| seen.call.clone()).collect()
    }

    pub(crate) fn seen(&self) -> Vec<Seen> {
        self.seen.read().clone()
    }

    pub(crate) fn num_calls(&self, call: &Call) -> usize {
        self.seen.read().iter().filter(|seen| &seen.call == call).count()
    }

    /// Errors delivered with `DidFinish`, if it was delivered.
    pub(crate) fn finish_errors(&self) -> Option<Vec<TaskError>> {
        self.seen
            .read()
            .iter()
            .find(|seen| matches!(seen.call, Call::Finish(_)))
            .map(|seen| seen.errors.clone())
    }

    pub(crate) fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::Acquire)
    }
}

impl Observer for SpyObserver {
    fn did_start(&self, task: &Task) {
        self.record(task, Call::Start, &[]);
    }

    fn did_produce(&self, task: &Task, produced: &Task) {
        self.record(task, Call::Produce(produced.id()), &[]);
    }

    fn did_cancel(&self, task: &Task) {
        self.record(task, Call::Cancel, &[]);
    }

    fn did_finish(&self, task: &Task, errors: &[TaskError]) {
        self.record(task, Call::Finish(errors.len()), errors);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Schedule,
    Release,
}

/// Wraps a scheduler and records which tasks went through it.
pub(crate) struct SpyScheduler<T> {
    pub(crate) inner: T,
    calls: RwLock<HashMap<Method, Vec<Id>>>,
}

impl<T: Schedule> SpyScheduler<T> {
    pub(crate) fn new(inner: T) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: RwLock::new(HashMap::from([
                (Method::Schedule, Vec::new()),
                (Method::Release, Vec::new()),
            ])),
        })
    }

    fn record(&self, method: Method, id: Id) {
        self.calls.write().entry(method).or_default().push(id);
    }

    pub(crate) fn get_calls(&self, method: Method) -> Vec<Id> {
        self.calls.read().get(&method).cloned().unwrap_or_default()
    }
}

impl<T> Deref for SpyScheduler<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T: Schedule> Schedule for SpyScheduler<T> {
    fn schedule(&self, task: Task) {
        self.record(Method::Schedule, task.id());
        self.inner.schedule(task);
    }

    fn release(&self, task: &Task) {
        self.record(Method::Release, task.id());
        self.inner.release(task);
    }
}
