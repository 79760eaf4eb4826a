mod atomic_cell;
pub use self::atomic_cell::AtomicCell;
