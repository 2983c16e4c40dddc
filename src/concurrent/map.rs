use std::borrow::Borrow;
use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::concurrent::table::{InsertOutcome, RawConcurrentTable};
use crate::mix::{make_hash, DefaultHashBuilder};
use crate::sync::{lock_both, MultiMutex};

// Round-robin stripe selection: each thread claims a process-wide slot on
// first use. A thread exiting merely retires its slot, which only skews
// the stripe distribution, never correctness.
static STRIPE_SEED: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static STRIPE: Cell<usize> = const { Cell::new(usize::MAX) };
}

pub(crate) fn stripe_id() -> usize {
    STRIPE.with(|cell| {
        let mut id = cell.get();
        if id == usize::MAX {
            id = STRIPE_SEED.fetch_add(1, Ordering::Relaxed);
            cell.set(id);
        }
        id
    })
}

struct Inner<K, V, S> {
    hash_builder: S,
    table: RawConcurrentTable<(K, V)>,
}

/// Concurrency-safe unique-key hash map.
///
/// All operations take `&self`; synchronization is internal. Lookups go
/// through visitation ([`visit`](ConcurrentMap::visit) and friends)
/// because references must not outlive the per-group locks. Operations on
/// distinct groups run in parallel; same-group operations and structural
/// operations (rehash, clear, swap, merge) are linearized.
///
/// Visitors are invoked with the relevant group lock held and must not
/// call back into the same map, on pain of deadlock.
pub struct ConcurrentMap<K, V, S = DefaultHashBuilder> {
    mutexes: MultiMutex,
    inner: UnsafeCell<Inner<K, V, S>>,
}

unsafe impl<K: Send, V: Send, S: Send> Send for ConcurrentMap<K, V, S> {}
unsafe impl<K: Send + Sync, V: Send + Sync, S: Send + Sync> Sync for ConcurrentMap<K, V, S> {}

impl<K, V> ConcurrentMap<K, V, DefaultHashBuilder> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> ConcurrentMap<K, V, S> {
    #[inline]
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    #[inline]
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        ConcurrentMap {
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

    pub fn max_load(&self) -> usize {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        unsafe { &*self.inner.get() }.table.max_load()
    }

    pub fn load_factor(&self) -> f32 {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        let table = &unsafe { &*self.inner.get() }.table;
        if table.capacity() == 0 {
            0.0
        } else {
            table.len() as f32 / table.capacity() as f32
        }
    }

    /// Removes every entry. Linearized against all other operations.
    pub fn clear(&self) {
        let _all = self.mutexes.write_all();
        unsafe { &mut *self.inner.get() }.table.clear_exclusive();
    }
}

impl<K, V, S> ConcurrentMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Inserts the pair if the key is absent. Returns whether an
    /// insertion happened; an existing entry is left untouched.
    #[inline]
    pub fn insert(&self, k: K, v: V) -> bool {
        self.insert_or_visit(k, v, |_| {})
    }

    /// Inserts the pair if the key is absent, otherwise visits the
    /// existing value under the group's exclusive lock.
    pub fn insert_or_visit(&self, k: K, v: V, mut f: impl FnMut(&mut V)) -> bool {
        let mut value = Some((k, v));
        loop {
            let outcome = {
                let _stripe = self.mutexes.stripe(stripe_id()).read();
                let inner = unsafe { &*self.inner.get() };
                let hash = make_hash(&inner.hash_builder, &value.as_ref().unwrap().0);
                inner.table.insert_or_visit(
                    hash,
                    &mut value,
                    |stored, incoming| stored.0 == incoming.0,
                    |p| f(unsafe { &mut (*p).1 }),
                )
            };
            match outcome {
                InsertOutcome::Inserted => return true,
                InsertOutcome::Visited => return false,
                InsertOutcome::Full => self.rehash_if_full(),
            }
        }
    }

    /// Visits the value for `k` under the group's shared lock. Returns
    /// the number of entries visited (0 or 1).
    pub fn visit<Q>(&self, k: &Q, f: impl FnOnce(&V)) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        let inner = unsafe { &*self.inner.get() };
        let hash = make_hash(&inner.hash_builder, k);
        let mut f = Some(f);
        inner.table.internal_visit(hash, |stored| k.eq(stored.0.borrow()), false, |_, pos, n| {
            let p = inner.table.element(pos, n);
            (f.take().unwrap())(unsafe { &(*p).1 });
        })
    }

    /// Visits the value for `k` mutably under the group's exclusive lock.
    pub fn visit_mut<Q>(&self, k: &Q, f: impl FnOnce(&mut V)) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        let inner = unsafe { &*self.inner.get() };
        let hash = make_hash(&inner.hash_builder, k);
        let mut f = Some(f);
        inner.table.internal_visit(hash, |stored| k.eq(stored.0.borrow()), true, |_, pos, n| {
            let p = inner.table.element(pos, n);
            (f.take().unwrap())(unsafe { &mut (*p).1 });
        })
    }

    /// Visits every entry under per-group exclusive locks; returns how
    /// many were visited.
    pub fn visit_all(&self, mut f: impl FnMut(&K, &V)) -> usize {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        let inner = unsafe { &*self.inner.get() };
        inner.table.for_each_locked(|p| {
            let entry = unsafe { &*p };
            f(&entry.0, &entry.1);
        })
    }

    /// Mutable flavor of [`ConcurrentMap::visit_all`].
    pub fn visit_all_mut(&self, mut f: impl FnMut(&K, &mut V)) -> usize {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        let inner = unsafe { &*self.inner.get() };
        inner.table.for_each_locked(|p| {
            let entry = unsafe { &mut *p };
            f(&entry.0, &mut entry.1);
        })
    }

    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.visit(k, |_| {}) == 1
    }

    /// Removes the entry for `k`; returns whether one existed.
    pub fn remove<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.erase_if(k, |_| true) == 1
    }

    /// Removes the entry for `k` if the predicate approves its value.
    /// Returns the number of entries erased (0 or 1).
    pub fn erase_if<Q>(&self, k: &Q, mut pred: impl FnMut(&V) -> bool) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        let inner = unsafe { &*self.inner.get() };
        let hash = make_hash(&inner.hash_builder, k);
        inner.table.erase_if(hash, |stored| k.eq(stored.0.borrow()), |entry| pred(&entry.1))
    }

    /// Keeps only entries the predicate approves; returns how many were
    /// erased.
    pub fn retain(&self, mut f: impl FnMut(&K, &mut V) -> bool) -> usize {
        let _stripe = self.mutexes.stripe(stripe_id()).read();
        let inner = unsafe { &*self.inner.get() };
        inner.table.retain_locked(|p| {
            let entry = unsafe { &mut *p };
            f(&entry.0, &mut entry.1)
        })
    }

    /// Rebuilds with capacity for at least `n` elements. Linearized
    /// against all other operations.
    pub fn rehash(&self, n: usize) {
        let _all = self.mutexes.write_all();
        let inner = unsafe { &mut *self.inner.get() };
        let Inner { hash_builder, table } = inner;
        table.rehash_exclusive(n, |x| make_hash(hash_builder, &x.0));
    }

    /// Ensures capacity for at least `n` elements in total.
    pub fn reserve(&self, n: usize) {
        let _all = self.mutexes.write_all();
        let inner = unsafe { &mut *self.inner.get() };
        if n > inner.table.max_load() {
            let Inner { hash_builder, table } = inner;
            table.grow_exclusive(n, |x| make_hash(hash_builder, &x.0));
        }
    }

    /// Moves entries of `other` whose keys are absent here into `self`;
    /// conflicting entries stay behind. Both lock arrays are taken in
    /// address order, so concurrent cross-merges cannot deadlock.
    pub fn merge<S2: BuildHasher>(&self, other: &ConcurrentMap<K, V, S2>) {
        if self as *const _ as usize == other as *const _ as usize {
            return;
        }
        let _both = lock_both(&self.mutexes, &other.mutexes);
        let dst = unsafe { &mut *self.inner.get() };
        let src = unsafe { &mut *other.inner.get() };
        let Inner { hash_builder: dst_hasher, table: dst_table } = dst;
        let Inner { hash_builder: src_hasher, table: src_table } = src;
        let mut kept = Vec::new();
        src_table.take_each_exclusive(|entry| {
            let hash = make_hash(dst_hasher, &entry.0);
            if dst_table.find_exclusive(hash, |x| x.0 == entry.0).is_some() {
                kept.push(entry);
            } else {
                dst_table.insert_unique_exclusive(hash, entry, |x| make_hash(dst_hasher, &x.0));
            }
        });
        for entry in kept {
            let hash = make_hash(src_hasher, &entry.0);
            src_table.insert_unique_exclusive(hash, entry, |x| make_hash(src_hasher, &x.0));
        }
    }

    /// Swaps the contents of two maps under both exclusive locks.
    pub fn swap(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        let _both = lock_both(&self.mutexes, &other.mutexes);
        unsafe { std::mem::swap(&mut *self.inner.get(), &mut *other.inner.get()) };
    }

    #[cold]
    fn rehash_if_full(&self) {
        let _all = self.mutexes.write_all();
        let inner = unsafe { &mut *self.inner.get() };
        if inner.table.len() >= inner.table.max_load() {
            let capacity = inner.table.capacity() + 1;
            let Inner { hash_builder, table } = inner;
            table.rehash_exclusive(capacity, |x| make_hash(hash_builder, &x.0));
        }
    }
}

impl<K, V, S: Default> Default for ConcurrentMap<K, V, S> {
    #[inline]
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> fmt::Debug for ConcurrentMap<K, V, S>
where
    K: Eq + Hash + fmt::Debug,
    V: fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.visit_all(|k, v| {
            map.entry(k, v);
        });
        map.finish()
    }
}
