use std::borrow::Borrow;
use std::cell::UnsafeCell;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use crate::concurrent::map::stripe_id;
use crate::concurrent::table::{InsertOutcome, RawConcurrentTable};
use crate::mix::{make_hash, DefaultHashBuilder};
use crate::sync::MultiMutex;

struct Inner<T, S> {
    hash_builder: S,
    table: RawConcurrentTable<T>,
}

/// Concurrency-safe unique-key hash set; the value-only counterpart of
/// [`ConcurrentMap`](crate::ConcurrentMap), with the same locking scheme
/// and visitation API.
pub struct ConcurrentSet<T, S = DefaultHashBuilder> {
    mutexes: MultiMutex,
    inner: UnsafeCell<Inner<T, S>>,
}

unsafe impl<T: Send, S: Send> Send for ConcurrentSet<T, S> {}
unsafe impl<T: Send + Sync, S: Send + Sync> Sync for ConcurrentSet<T, S> {}

impl<T> ConcurrentSet<T, DefaultHashBuilder> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<T, S> ConcurrentSet<T, S> {
    #[inline]
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    #[inline]
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        ConcurrentSet {
            mutexes: MultiMutex::new(),
            inner: UnsafeCell::new(Inner {
                hash_builder,
                table: RawConcurrentTable::with_capacity(capacity),
            }),
        }
    }

    pub fn len(&self) -> usize {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        unsafe { &*self.inner.get() }.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        unsafe { &*self.inner.get() }.table.capacity()
    }

    pub fn clear(&self) {
        let _all = self.mutexes.write_all();
        unsafe { &mut *self.inner.get() }.table.clear_exclusive();
    }
}

impl<T, S> ConcurrentSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher,
{
    /// Inserts the value if absent; returns whether an insertion
    /// happened.
    pub fn insert(&self, value: T) -> bool {
        let mut value = Some(value);
        loop {
            let outcome = {
                let _stripe = self.mutexes.stripe(stripe_id()).read();
                let inner = unsafe { &*self.inner.get() };
                let hash = make_hash(&inner.hash_builder, value.as_ref().unwrap());
                inner.table.insert_or_visit(
                    hash,
                    &mut value,
                    |stored, incoming| stored == incoming,
                    |_| {},
                )
            };
            match outcome {
                InsertOutcome::Inserted => return true,
                InsertOutcome::Visited => return false,
                InsertOutcome::Full => self.rehash_if_full(),
            }
        }
    }

    /// Visits the stored value equal to `value` under the group's shared
    /// lock; returns the number visited (0 or 1).
    pub fn visit<Q>(&self, value: &Q, f: impl FnOnce(&T)) -> usize
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        let inner = unsafe { &*self.inner.get() };
        let hash = make_hash(&inner.hash_builder, value);
        let mut f = Some(f);
        inner.table.internal_visit(
            hash,
            |stored| value.eq(stored.borrow()),
            false,
            |_, pos, n| {
                let p = inner.table.element(pos, n);
                (f.take().unwrap())(unsafe { &*p });
            },
        )
    }

    /// Visits every value under per-group exclusive locks.
    pub fn visit_all(&self, mut f: impl FnMut(&T)) -> usize {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        let inner = unsafe { &*self.inner.get() };
        inner.table.for_each_locked(|p| f(unsafe { &*p }))
    }

    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.visit(value, |_| {}) == 1
    }

    /// Removes the value; returns whether it was present.
    pub fn remove<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.erase_if(value, |_| true) == 1
    }

    /// Removes the value if the predicate approves it; returns the number
    /// erased (0 or 1).
    pub fn erase_if<Q>(&self, value: &Q, pred: impl FnMut(&T) -> bool) -> usize
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        let inner = unsafe { &*self.inner.get() };
        let hash = make_hash(&inner.hash_builder, value);
        inner.table.erase_if(hash, |stored| value.eq(stored.borrow()), pred)
    }

    /// Keeps only values the predicate approves; returns how many were
    /// erased.
    pub fn retain(&self, mut f: impl FnMut(&T) -> bool) -> usize {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        let inner = unsafe { &*self.inner.get() };
        inner.table.retain_locked(|p| f(unsafe { &*p }))
    }

    pub fn reserve(&self, n: usize) {
        let _all = self.mutexes.write_all();
        let inner = unsafe { &mut *self.inner.get() };
        if n > inner.table.max_load() {
            let Inner { hash_builder, table } = inner;
            table.grow_exclusive(n, |x| make_hash(hash_builder, x));
        }
    }

    pub fn rehash(&self, n: usize) {
        let _all = self.mutexes.write_all();
        let inner = unsafe { &mut *self.inner.get() };
        let Inner { hash_builder, table } = inner;
        table.rehash_exclusive(n, |x| make_hash(hash_builder, x));
    }

    #[cold]
    fn rehash_if_full(&self) {
        let _all = self.mutexes.write_all();
        let inner = unsafe { &mut *self.inner.get() };
        if inner.table.len() >= inner.table.max_load() {
            let capacity = inner.table.capacity() + 1;
            let Inner { hash_builder, table } = inner;
            table.rehash_exclusive(capacity, |x| make_hash(hash_builder, x));
        }
    }
}

impl<T, S: Default> Default for ConcurrentSet<T, S> {
    #[inline]
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<T, S> fmt::Debug for ConcurrentSet<T, S>
where
    T: Eq + Hash + fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        self.visit_all(|v| {
            set.entry(v);
        });
        set.finish()
    }
}
