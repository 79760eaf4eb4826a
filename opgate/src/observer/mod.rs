//! Lifecycle listeners.
//!
//! Observers are the only way to learn that a task finished. Events for one
//! task are delivered one at a time, in the order the state machine reaches
//! them: `DidStart`, then any number of `DidCancel`/`DidProduce`, then
//! `DidFinish`. A task cancelled before it starts never emits `DidStart`.
use crate::task::{Task, TaskError};
use std::fmt;
use std::sync::Arc;

mod block;
pub use self::block::BlockObserver;

mod forward;
pub use self::forward::ProduceForwarder;

mod timeout;
pub use self::timeout::TimeoutObserver;

/// Listener contract. Every method defaults to doing nothing.
///
/// Callbacks run on whichever thread is delivering the task's events, with no
/// task lock held. They may call into this task or any other one: a
/// transition raised from a callback is queued and delivered once the current
/// event reached every observer.
///
/// A panicking observer is logged and skipped. The task still delivers the
/// event to the remaining observers and keeps going.
pub trait Observer: Send + Sync + 'static {
    fn did_start(&self, _task: &Task) {}

    fn did_produce(&self, _task: &Task, _produced: &Task) {}

    fn did_cancel(&self, _task: &Task) {}

    fn did_finish(&self, _task: &Task, _errors: &[TaskError]) {}
}

// Share one observer across tasks.
impl<O: Observer + ?Sized> Observer for Arc<O> {
    fn did_start(&self, task: &Task) {
        (**self).did_start(task)
    }

    fn did_produce(&self, task: &Task, produced: &Task) {
        (**self).did_produce(task, produced)
    }

    fn did_cancel(&self, task: &Task) {
        (**self).did_cancel(task)
    }

    fn did_finish(&self, task: &Task, errors: &[TaskError]) {
        (**self).did_finish(task, errors)
    }
}

/// A lifecycle event, as delivered to observers.
#[derive(Clone)]
pub enum Event {
    DidStart,
    DidProduce(Task),
    DidCancel,
    DidFinish(Vec<TaskError>),
}

impl Event {
    pub(crate) fn dispatch(&self, observer: &dyn Observer, task: &Task) {
        match self {
            Event::DidStart => observer.did_start(task),
            Event::DidProduce(produced) => observer.did_produce(task, produced),
            Event::DidCancel => observer.did_cancel(task),
            Event::DidFinish(errors) => observer.did_finish(task, errors),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::DidStart => EventKind::DidStart,
            Event::DidProduce(_) => EventKind::DidProduce,
            Event::DidCancel => EventKind::DidCancel,
            Event::DidFinish(_) => EventKind::DidFinish,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::DidStart => f.write_str("DidStart"),
            Event::DidProduce(task) => f.debug_tuple("DidProduce").field(&task.id()).finish(),
            Event::DidCancel => f.write_str("DidCancel"),
            Event::DidFinish(errors) => f.debug_tuple("DidFinish").field(errors).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DidStart,
    DidProduce,
    DidCancel,
    DidFinish,
}
