use parking_lot::Mutex;
use std::fmt;

/// A thread-safe mutable cell.
///
/// Every operation is a short critical section under a `parking_lot::Mutex`,
/// which makes reads, writes and read-modify-write cycles linearizable with
/// respect to each other. Nothing in here ever suspends, the only unbounded
/// cost is the closure handed to [`modify`] or [`update`].
///
/// The closures run while the lock is held. They must not touch the same
/// cell again or they will deadlock.
///
/// [`modify`]: AtomicCell::modify
/// [`update`]: AtomicCell::update
#[derive(Default)]
pub struct AtomicCell<T> {
    inner: Mutex<T>,
}

impl<T> AtomicCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Unconditionally overwrites the stored value.
    pub fn set(&self, value: T) {
        *self.inner.lock() = value;
    }

    /// Stores `value` and returns the previous one.
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.inner.lock(), value)
    }

    /// Runs `f` against the stored value in place and returns whatever `f`
    /// returns. This is the primitive behind conditional transitions, where
    /// the caller needs to know what the value was *and* change it in one go.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Clone> AtomicCell<T> {
    pub fn get(&self) -> T {
        self.inner.lock().clone()
    }

    /// Replaces the stored value with `f(old)` and returns the new value.
    pub fn modify(&self, f: impl FnOnce(T) -> T) -> T {
        let mut guard = self.inner.lock();
        let next = f(guard.clone());
        *guard = next.clone();
        next
    }
}

impl<T: fmt::Debug> fmt::Debug for AtomicCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicCell").field(&*self.inner.lock()).finish()
    }
}
