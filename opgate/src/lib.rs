//! Cooperative task framework: tasks gated by dependencies and asynchronous
//! conditions, observed through lifecycle events, run by a host scheduler.
//!
//! A host hands a [`Task`] over with [`host::handoff`], starts it once
//! [`Task::is_ready`], and the task does the rest: it evaluates its
//! [`Condition`]s, runs its [`Execute`] strategy when they all pass, and tells
//! its [`Observer`]s about every step until it finishes.
//!
//! [`Condition`]: condition::Condition
//! [`Observer`]: observer::Observer
//! [`Execute`]: task::Execute
pub mod condition;

pub mod host;

pub mod observer;

pub mod sync;

pub mod task;
pub use task::{Task, TaskBuilder, TaskError, TaskState};

#[cfg(test)]
mod test_utils;
