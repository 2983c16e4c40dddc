use crate::sync::{AtomicU32, Ordering};
use std::ops::{Deref, DerefMut};

/// Pads and aligns a value to the length of a cache line, so that hot locks
/// sitting next to each other in an array do not false-share.
#[repr(align(64))]
#[derive(Default)]
pub struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    pub fn new(value: T) -> Self {
        CachePadded { value }
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for CachePadded<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

const SPIN_LIMIT: u32 = 6;

/// Exponential backoff between acquisition attempts: a growing number of
/// spin hints first, a scheduler yield once the budget is spent.
pub(crate) struct Backoff {
    step: u32,
}

impl Backoff {
    #[inline]
    pub(crate) fn new() -> Self {
        Backoff { step: 0 }
    }

    #[inline]
    pub(crate) fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..1u32 << self.step {
                spin_hint();
            }
            self.step += 1;
        } else {
            yield_now();
        }
    }
}

#[cfg(loom)]
#[inline]
fn spin_hint() {
    loom::thread::yield_now();
}

#[cfg(not(loom))]
#[inline]
fn spin_hint() {
    std::hint::spin_loop();
}

#[cfg(loom)]
#[inline]
fn yield_now() {
    loom::thread::yield_now();
}

#[cfg(not(loom))]
#[inline]
fn yield_now() {
    std::thread::yield_now();
}

const WRITER: u32 = 1 << 31;

/// Low-overhead shared/exclusive spinlock.
///
/// The whole lock is one 32-bit word: the high bit marks an exclusive
/// holder, the remaining bits count readers. Readers optimistically bump
/// the count and undo the bump if a writer holds the lock, so the
/// uncontended shared path is a single fetch-add.
pub struct RwSpinlock {
    state: AtomicU32,
}

impl Default for RwSpinlock {
    fn default() -> Self {
        Self::new()
    }
}

impl RwSpinlock {
    pub fn new() -> Self {
        RwSpinlock { state: AtomicU32::new(0) }
    }

    #[inline]
    pub fn try_lock_shared(&self) -> bool {
        let state = self.state.fetch_add(1, Ordering::Acquire);
        if state & WRITER != 0 {
            self.state.fetch_sub(1, Ordering::Release);
            return false;
        }
        true
    }

    #[inline]
    pub fn lock_shared(&self) {
        let mut backoff = Backoff::new();
        while !self.try_lock_shared() {
            while self.state.load(Ordering::Relaxed) & WRITER != 0 {
                backoff.snooze();
            }
        }
    }

    #[inline]
    pub fn unlock_shared(&self) {
        let prev = self.state.fetch_sub(1, Ordering::Release);
        debug_assert!(prev & !WRITER > 0);
    }

    #[inline]
    pub fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn lock(&self) {
        let mut backoff = Backoff::new();
        while !self.try_lock() {
            while self.state.load(Ordering::Relaxed) != 0 {
                backoff.snooze();
            }
        }
    }

    #[inline]
    pub fn unlock(&self) {
        // Readers may have transiently bumped the count, so only the writer
        // bit is cleared.
        let prev = self.state.fetch_sub(WRITER, Ordering::Release);
        debug_assert!(prev & WRITER != 0);
    }

    #[inline]
    pub fn read(&self) -> ReadGuard<'_> {
        self.lock_shared();
        ReadGuard { lock: self }
    }

    #[inline]
    pub fn write(&self) -> WriteGuard<'_> {
        self.lock();
        WriteGuard { lock: self }
    }
}

pub struct ReadGuard<'a> {
    lock: &'a RwSpinlock,
}

impl Drop for ReadGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock_shared();
    }
}

pub struct WriteGuard<'a> {
    lock: &'a RwSpinlock,
}

impl Drop for WriteGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Number of stripes in a [`MultiMutex`].
pub const STRIPES: usize = 128;

/// Striped table-level lock: a fixed array of cache-line-padded spinlocks.
///
/// A shared acquisition takes exactly one stripe (the caller picks which),
/// spreading readers over independent cache lines. A structural operation
/// takes every stripe in index order and therefore excludes all of them.
pub struct MultiMutex {
    locks: Box<[CachePadded<RwSpinlock>]>,
}

impl Default for MultiMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiMutex {
    pub fn new() -> Self {
        let locks: Vec<CachePadded<RwSpinlock>> =
            (0..STRIPES).map(|_| CachePadded::new(RwSpinlock::new())).collect();
        MultiMutex { locks: locks.into_boxed_slice() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    #[inline]
    pub fn stripe(&self, n: usize) -> &RwSpinlock {
        &self.locks[n & (STRIPES - 1)]
    }

    pub fn lock_all(&self) {
        for lock in self.locks.iter() {
            lock.lock();
        }
    }

    pub fn unlock_all(&self) {
        for lock in self.locks.iter().rev() {
            lock.unlock();
        }
    }

    #[inline]
    pub fn write_all(&self) -> MultiWriteGuard<'_> {
        self.lock_all();
        MultiWriteGuard { mutex: self }
    }
}

pub struct MultiWriteGuard<'a> {
    mutex: &'a MultiMutex,
}

impl Drop for MultiWriteGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock_all();
    }
}

/// Exclusive access to two lock arrays at once, e.g. for merging one table
/// into another. Acquisition is ordered by array address so two threads
/// locking the same pair in opposite argument order cannot deadlock; equal
/// addresses collapse to a single acquisition.
pub(crate) struct ExclusiveBiGuard<'a> {
    first: &'a MultiMutex,
    second: Option<&'a MultiMutex>,
}

pub(crate) fn lock_both<'a>(x: &'a MultiMutex, y: &'a MultiMutex) -> ExclusiveBiGuard<'a> {
    if std::ptr::eq(x, y) {
        x.lock_all();
        return ExclusiveBiGuard { first: x, second: None };
    }
    let (first, second) = if (x as *const MultiMutex) < (y as *const MultiMutex) {
        (x, y)
    } else {
        (y, x)
    };
    first.lock_all();
    second.lock_all();
    ExclusiveBiGuard { first, second: Some(second) }
}

impl Drop for ExclusiveBiGuard<'_> {
    fn drop(&mut self) {
        if let Some(second) = self.second {
            second.unlock_all();
        }
        self.first.unlock_all();
    }
}
