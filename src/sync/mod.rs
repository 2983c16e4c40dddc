//! Synchronization primitives used by the concurrent containers.
//!
//! Everything here is busy-waiting with exponential backoff; no futex or
//! kernel sleep is involved. The atomics are routed through a shim so the
//! lock can be model-checked under loom.

mod rw_spinlock;

pub use rw_spinlock::{
    CachePadded, MultiMutex, MultiWriteGuard, ReadGuard, RwSpinlock, WriteGuard, STRIPES,
};

pub(crate) use rw_spinlock::lock_both;

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicU32, Ordering};
#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicU32, Ordering};
