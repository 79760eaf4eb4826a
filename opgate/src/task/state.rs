use bitflags::bitflags;

bitflags! {
    /// Every lifecycle flag of a task packed into one value.
    ///
    /// The task keeps a single `AtomicCell<Flags>`, so each flag is
    /// linearizable on its own and any group of flags can be flipped in one
    /// critical section. In particular `finish` clears `EXECUTING` and sets
    /// `FINISHED` together: no observer can ever see both set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub(crate) struct Flags: u8 {
        /// Handed to the host scheduler. Closes the dependency window.
        const ENQUEUED = 1;

        /// `start` was called. Closes the condition window.
        const EVALUATING = 1 << 1;

        /// The execution strategy is running.
        const EXECUTING = 1 << 2;

        /// `finish` was claimed but observers are still being notified.
        const FINISHING = 1 << 3;

        /// Terminal.
        const FINISHED = 1 << 4;

        /// Orthogonal to the rest. Advisory only.
        const CANCELLED = 1 << 5;
    }
}

impl Flags {
    pub(crate) fn is_started(self) -> bool {
        self.intersects(Flags::EVALUATING | Flags::EXECUTING | Flags::FINISHING | Flags::FINISHED)
    }

    /// `finish` has been claimed, whether or not it completed.
    pub(crate) fn is_finishing(self) -> bool {
        self.intersects(Flags::FINISHING | Flags::FINISHED)
    }

    pub(crate) fn state(self) -> TaskState {
        if self.contains(Flags::FINISHED) {
            TaskState::Finished
        } else if self.contains(Flags::EXECUTING) {
            TaskState::Executing
        } else if self.contains(Flags::EVALUATING) {
            TaskState::EvaluatingConditions
        } else if self.contains(Flags::ENQUEUED) {
            TaskState::Enqueued
        } else {
            TaskState::Initial
        }
    }
}

/// Coarse lifecycle stage of a task. Cancellation is tracked separately, see
/// [`Task::is_cancelled`].
///
/// [`Task::is_cancelled`]: crate::task::Task::is_cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskState {
    Initial,
    Enqueued,
    EvaluatingConditions,
    Executing,
    Finished,
}
