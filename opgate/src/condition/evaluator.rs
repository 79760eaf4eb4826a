use crate::condition::{Completion, Condition, ConditionResult};
use crate::task::{Task, TaskError};
use futures::channel::oneshot;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// Most tasks carry a handful of conditions at most.
const INLINE_CONDITIONS: usize = 4;

type OnDone = Box<dyn FnOnce(Vec<TaskError>) + Send + 'static>;

/// Runs every condition of a task and joins their verdicts.
///
/// Conditions are fanned out one after the other on the calling thread, but
/// each of them is free to answer asynchronously. The join is a countdown: the
/// verdict that brings it to zero runs the continuation, on whichever thread
/// delivered it. Nobody ever blocks waiting for a verdict.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Evaluates `conditions` for `task` and hands the failures to `on_done`.
    ///
    /// Failures are reported in declaration order regardless of the order in
    /// which verdicts arrive. `on_done` runs exactly once. It runs before this
    /// function returns when every condition answers synchronously, when there
    /// are no conditions, or when `task` is already cancelled (in which case
    /// no condition is evaluated at all and the list is empty).
    pub fn evaluate<F>(conditions: &[Arc<dyn Condition>], task: &Task, on_done: F)
    where
        F: FnOnce(Vec<TaskError>) + Send + 'static,
    {
        if task.is_cancelled() {
            tracing::trace!(task = %task.id(), "task cancelled, skipping condition evaluation");
            on_done(Vec::new());
            return;
        }

        if conditions.is_empty() {
            on_done(Vec::new());
            return;
        }

        let fan_in = Arc::new(FanIn::new(conditions.len(), Box::new(on_done)));

        for (slot, condition) in conditions.iter().enumerate() {
            let fan_in = Arc::clone(&fan_in);
            let completion = Completion::new(condition.name(), move |result| {
                fan_in.report(slot, result);
            });

            tracing::trace!(task = %task.id(), condition = %condition.name(), "evaluating");
            condition.evaluate(task, completion);
        }
    }

    /// Same as [`evaluate`](Self::evaluate), as a future.
    pub fn evaluate_future(
        conditions: &[Arc<dyn Condition>],
        task: &Task,
    ) -> impl Future<Output = Vec<TaskError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();

        Self::evaluate(conditions, task, move |errors| {
            // The receiver going away just means nobody cares anymore.
            let _ = tx.send(errors);
        });

        async move { rx.await.unwrap_or_default() }
    }
}

/// Callback-counting barrier shared by the completions of one evaluation.
struct FanIn {
    remaining: AtomicUsize,
    // One slot per condition, so the result keeps declaration order.
    slots: Mutex<SmallVec<[Option<TaskError>; INLINE_CONDITIONS]>>,
    on_done: Mutex<Option<OnDone>>,
}

impl FanIn {
    fn new(n: usize, on_done: OnDone) -> Self {
        Self {
            remaining: AtomicUsize::new(n),
            slots: Mutex::new(SmallVec::from_elem(None, n)),
            on_done: Mutex::new(Some(on_done)),
        }
    }

    fn report(&self, slot: usize, result: ConditionResult) {
        if let Some(err) = result.into_error() {
            self.slots.lock()[slot] = Some(err);
        }

        // AcqRel: the last reporter must observe every slot written before it.
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        let errors = self
            .slots
            .lock()
            .drain(..)
            .flatten()
            .collect::<Vec<_>>();

        if let Some(on_done) = self.on_done.lock().take() {
            on_done(errors);
        }
    }
}
