use crate::observer::Observer;
use crate::task::{Task, TaskError};
use std::fmt;

type OnTask = Box<dyn Fn(&Task) + Send + Sync + 'static>;
type OnProduce = Box<dyn Fn(&Task, &Task) + Send + Sync + 'static>;
type OnFinish = Box<dyn Fn(&Task, &[TaskError]) + Send + Sync + 'static>;

/// Observer assembled from closures. Unset events are ignored.
///
/// ```ignore
/// let observer = BlockObserver::new()
///     .on_finish(|task, errors| println!("{} done with {} error(s)", task.id(), errors.len()));
/// task.add_observer(observer)?;
/// ```
#[derive(Default)]
pub struct BlockObserver {
    on_start: Option<OnTask>,
    on_produce: Option<OnProduce>,
    on_cancel: Option<OnTask>,
    on_finish: Option<OnFinish>,
}

impl BlockObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, f: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    pub fn on_produce(mut self, f: impl Fn(&Task, &Task) + Send + Sync + 'static) -> Self {
        self.on_produce = Some(Box::new(f));
        self
    }

    pub fn on_cancel(mut self, f: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Box::new(f));
        self
    }

    pub fn on_finish(mut self, f: impl Fn(&Task, &[TaskError]) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Box::new(f));
        self
    }
}

impl Observer for BlockObserver {
    fn did_start(&self, task: &Task) {
        if let Some(f) = &self.on_start {
            f(task);
        }
    }

    fn did_produce(&self, task: &Task, produced: &Task) {
        if let Some(f) = &self.on_produce {
            f(task, produced);
        }
    }

    fn did_cancel(&self, task: &Task) {
        if let Some(f) = &self.on_cancel {
            f(task);
        }
    }

    fn did_finish(&self, task: &Task, errors: &[TaskError]) {
        if let Some(f) = &self.on_finish {
            f(task, errors);
        }
    }
}

impl fmt::Debug for BlockObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockObserver")
            .field("on_start", &self.on_start.is_some())
            .field("on_produce", &self.on_produce.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}
