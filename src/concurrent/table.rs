use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::concurrent::group::ConcurrentGroup;
use crate::foa::bitmask::BitMaskIter;
use crate::foa::group::GROUP_SLOTS;
use crate::foa::table::Prober;
use crate::hint::likely;
use crate::policy::Pow2SizePolicy;

pub(crate) const N: usize = GROUP_SLOTS;

/// Outcome of the optimistic no-rehash insertion path.
pub(crate) enum InsertOutcome {
    /// The element was inserted.
    Inserted,
    /// An equal key was already present and got visited instead.
    Visited,
    /// The size reservation hit max load; the caller must take the
    /// exclusive route, rehash, and retry.
    Full,
}

/// Open-addressing storage with per-group coordination state, driven by a
/// [`ConcurrentMap`](crate::ConcurrentMap) under its striped table lock.
///
/// Shared-access operations synchronize purely through the group locks
/// and atomic metadata; `&mut` methods assume the caller holds every
/// stripe of the table lock exclusively.
///
/// Unlike the single-threaded engine the arrays exist from construction,
/// which spares every operation an allocation check that would otherwise
/// need its own synchronization.
pub(crate) struct RawConcurrentTable<T> {
    groups: Box<[ConcurrentGroup]>,
    elements: Box<[UnsafeCell<MaybeUninit<T>>]>,
    groups_size_mask: usize,
    /// Live elements plus in-flight reservations; reads clamp to `ml`.
    size: AtomicUsize,
    ml: usize,
    mlf: f32,
}

unsafe impl<T: Send> Send for RawConcurrentTable<T> {}
unsafe impl<T: Send + Sync> Sync for RawConcurrentTable<T> {}

fn max_load_for(groups: usize, mlf: f32) -> usize {
    let capacity = groups * N - 1;
    let ml = (capacity as f64 * mlf as f64) as usize;
    ml.max(usize::min(capacity, N - 1)).min(capacity)
}

fn groups_for_capacity(cap: usize, mlf: f32) -> usize {
    let mut index = Pow2SizePolicy::size_index(cap / N + 1);
    while max_load_for(Pow2SizePolicy::size(index), mlf) < cap {
        index += 1;
    }
    Pow2SizePolicy::size(index)
}

impl<T> RawConcurrentTable<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self::with_groups(groups_for_capacity(usize::max(capacity, 1), 1.0), 1.0)
    }

    fn with_groups(groups_len: usize, mlf: f32) -> Self {
        debug_assert!(groups_len.is_power_of_two());
        let groups: Vec<ConcurrentGroup> =
            (0..groups_len).map(|_| ConcurrentGroup::new()).collect();
        groups[groups_len - 1].meta.set_sentinel();
        let elements: Vec<UnsafeCell<MaybeUninit<T>>> =
            (0..groups_len * N).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();
        RawConcurrentTable {
            groups: groups.into_boxed_slice(),
            elements: elements.into_boxed_slice(),
            groups_size_mask: groups_len - 1,
            size: AtomicUsize::new(0),
            ml: max_load_for(groups_len, mlf),
            mlf,
        }
    }

    #[inline]
    fn groups_len(&self) -> usize {
        self.groups_size_mask + 1
    }

    #[inline]
    fn position_for(&self, hash: u64) -> usize {
        (hash as usize) & self.groups_size_mask
    }

    #[inline]
    pub(crate) fn element(&self, pos: usize, n: usize) -> *mut T {
        self.elements[pos * N + n].get() as *mut T
    }

    /// Live elements; in-flight reservations are clamped away.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        usize::min(self.size.load(Ordering::Acquire), self.ml)
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.groups_len() * N - 1
    }

    #[inline]
    pub(crate) fn max_load(&self) -> usize {
        self.ml
    }

    /// Probes for an element equal under `eq`. On a fragment hit the
    /// group's lock is taken (exclusive when `exclusive`, shared
    /// otherwise), occupancy is re-checked under it, and the visitor runs
    /// with the element pinned. Returns how many elements were visited
    /// (0 or 1).
    pub(crate) fn internal_visit(
        &self,
        hash: u64,
        mut eq: impl FnMut(&T) -> bool,
        exclusive: bool,
        f: impl FnOnce(&ConcurrentGroup, usize, usize),
    ) -> usize {
        let mut f = Some(f);
        let mut pb = Prober::new(self.position_for(hash));
        loop {
            let pos = pb.get();
            let pg = &self.groups[pos];
            let mask = pg.meta.match_fragment(hash);
            if mask != 0 {
                let mut _shared = None;
                let mut _excl = None;
                if exclusive {
                    _excl = Some(pg.lock.write());
                } else {
                    _shared = Some(pg.lock.read());
                }
                for n in BitMaskIter::new(mask) {
                    // the snapshot may be stale; only trust slots still
                    // occupied now that the lock is held
                    if likely(pg.meta.is_occupied(n))
                        && likely(eq(unsafe { &*self.element(pos, n) }))
                    {
                        (f.take().unwrap())(pg, pos, n);
                        return 1;
                    }
                }
            }
            if likely(pg.meta.is_not_overflowed(hash)) {
                return 0;
            }
            if !pb.next(self.groups_size_mask) {
                return 0;
            }
        }
    }

    /// The no-rehash insertion protocol:
    ///
    /// 1. Record the starting group's insertion counter.
    /// 2. Look for an equal key; visit it and stop if found.
    /// 3. Reserve size; bail out `Full` past max load.
    /// 4. Probe for a free slot; under the group's exclusive lock publish
    ///    the fragment, then bump-and-check the starting group's counter.
    ///    A mismatch means another thread inserted from the same start
    ///    group since step 1 (possibly our key): roll the slot and the
    ///    reservation back and start over.
    /// 5. Write the element and commit.
    ///
    /// `value` is consumed exactly on the `Inserted` outcome.
    pub(crate) fn insert_or_visit(
        &self,
        hash: u64,
        value: &mut Option<T>,
        mut eq: impl FnMut(&T, &T) -> bool,
        mut visit: impl FnMut(*mut T),
    ) -> InsertOutcome {
        debug_assert!(value.is_some());
        'startover: loop {
            let pos0 = self.position_for(hash);
            let counter = self.groups[pos0].insert_counter.load(Ordering::Acquire);
            let incoming = value.as_ref();
            if self.internal_visit(
                hash,
                |stored| eq(stored, incoming.unwrap()),
                true,
                |_, pos, n| visit(self.element(pos, n)),
            ) == 1
            {
                return InsertOutcome::Visited;
            }

            if self.size.fetch_add(1, Ordering::AcqRel) + 1 > self.ml {
                self.size.fetch_sub(1, Ordering::AcqRel);
                return InsertOutcome::Full;
            }

            let mut pb = Prober::new(pos0);
            loop {
                let pos = pb.get();
                let pg = &self.groups[pos];
                let mask = pg.meta.match_available();
                if likely(mask != 0) {
                    let _lock = pg.lock.write();
                    for n in BitMaskIter::new(mask) {
                        if likely(!pg.meta.is_occupied(n)) {
                            pg.meta.set(n, hash);
                            if self.groups[pos0].insert_counter.fetch_add(1, Ordering::AcqRel)
                                != counter
                            {
                                // another insertion raced us from pos0;
                                // undo the slot and the reservation
                                pg.meta.reset(n);
                                self.size.fetch_sub(1, Ordering::AcqRel);
                                continue 'startover;
                            }
                            unsafe {
                                self.element(pos, n).write(value.take().unwrap());
                            }
                            return InsertOutcome::Inserted;
                        }
                    }
                }
                pg.meta.mark_overflow(hash);
                // keep wrapping: the size reservation guarantees a free
                // slot exists, though racing threads may make us lap
                let _ = pb.next(self.groups_size_mask);
            }
        }
    }

    /// Erases the element matching `eq` if the predicate approves it.
    /// Returns how many elements were erased (0 or 1).
    pub(crate) fn erase_if(
        &self,
        hash: u64,
        eq: impl FnMut(&T) -> bool,
        mut pred: impl FnMut(&T) -> bool,
    ) -> usize {
        let mut erased = 0;
        self.internal_visit(hash, eq, true, |pg, pos, n| {
            let p = self.element(pos, n);
            if pred(unsafe { &*p }) {
                unsafe { ptr::drop_in_place(p) };
                pg.meta.reset(n);
                self.size.fetch_sub(1, Ordering::AcqRel);
                erased = 1;
            }
        });
        erased
    }

    /// Visits every element under its group's exclusive lock; the caller
    /// holds a shared table stripe. Returns the number visited.
    pub(crate) fn for_each_locked(&self, mut f: impl FnMut(*mut T)) -> usize {
        let mut count = 0;
        for pos in 0..self.groups_len() {
            let pg = &self.groups[pos];
            let _lock = pg.lock.write();
            for n in BitMaskIter::new(pg.meta.match_really_occupied()) {
                f(self.element(pos, n));
                count += 1;
            }
        }
        count
    }

    /// Erases every element the predicate rejects. Returns the number
    /// erased.
    pub(crate) fn retain_locked(&self, mut keep: impl FnMut(*mut T) -> bool) -> usize {
        let mut erased = 0;
        for pos in 0..self.groups_len() {
            let pg = &self.groups[pos];
            let _lock = pg.lock.write();
            for n in BitMaskIter::new(pg.meta.match_really_occupied()) {
                let p = self.element(pos, n);
                if !keep(p) {
                    unsafe { ptr::drop_in_place(p) };
                    pg.meta.reset(n);
                    self.size.fetch_sub(1, Ordering::AcqRel);
                    erased += 1;
                }
            }
        }
        erased
    }

    /// Single-threaded insertion for callers holding every table stripe.
    pub(crate) fn insert_unique_exclusive(
        &mut self,
        hash: u64,
        value: T,
        hasher: impl Fn(&T) -> u64,
    ) {
        if self.size.load(Ordering::Relaxed) >= self.ml {
            let capacity = self.capacity() + 1;
            self.grow_exclusive(capacity, &hasher);
        }
        self.unchecked_insert_exclusive(hash, value);
    }

    fn unchecked_insert_exclusive(&mut self, hash: u64, value: T) {
        let mut pb = Prober::new(self.position_for(hash));
        loop {
            let pos = pb.get();
            let pg = &self.groups[pos];
            let mask = pg.meta.match_available();
            if mask != 0 {
                let n = mask.trailing_zeros() as usize;
                unsafe { self.element(pos, n).write(value) };
                pg.meta.set(n, hash);
                self.size.fetch_add(1, Ordering::Relaxed);
                return;
            }
            pg.meta.mark_overflow(hash);
            let more = pb.next(self.groups_size_mask);
            debug_assert!(more);
        }
    }

    /// Finds under exclusive table access, without group locks.
    pub(crate) fn find_exclusive(
        &self,
        hash: u64,
        mut eq: impl FnMut(&T) -> bool,
    ) -> Option<(usize, usize)> {
        let mut pb = Prober::new(self.position_for(hash));
        loop {
            let pos = pb.get();
            let pg = &self.groups[pos];
            let mask = pg.meta.match_fragment(hash);
            for n in BitMaskIter::new(mask) {
                if pg.meta.is_occupied(n) && eq(unsafe { &*self.element(pos, n) }) {
                    return Some((pos, n));
                }
            }
            if pg.meta.is_not_overflowed(hash) {
                return None;
            }
            if !pb.next(self.groups_size_mask) {
                return None;
            }
        }
    }

    /// Rebuilds into fresh arrays sized for at least `capacity` elements,
    /// re-inserting everything. Exclusive table access required.
    pub(crate) fn grow_exclusive(&mut self, capacity: usize, hasher: impl Fn(&T) -> u64) {
        let live = self.len();
        let groups_len = groups_for_capacity(usize::max(capacity, live), self.mlf);
        let mut new = Self::with_groups(groups_len, self.mlf);
        for pos in 0..self.groups_len() {
            let pg = &self.groups[pos];
            for n in BitMaskIter::new(pg.meta.match_really_occupied()) {
                let value = unsafe { ptr::read(self.element(pos, n)) };
                pg.meta.reset(n);
                let hash = hasher(&value);
                new.unchecked_insert_exclusive(hash, value);
            }
        }
        *self = new;
    }

    /// Rebuilds only when the group count would change. Exclusive table
    /// access required; called when an insertion found the table full.
    pub(crate) fn rehash_exclusive(&mut self, capacity: usize, hasher: impl Fn(&T) -> u64) {
        let live = self.len();
        let groups_len = groups_for_capacity(usize::max(capacity, live).max(1), self.mlf);
        if groups_len != self.groups_len() {
            self.grow_exclusive(capacity, hasher);
        }
    }

    /// Takes every element out by value, freeing its slot. Exclusive
    /// table access required.
    pub(crate) fn take_each_exclusive(&mut self, mut f: impl FnMut(T)) {
        for pos in 0..self.groups_len() {
            let pg = &self.groups[pos];
            for n in BitMaskIter::new(pg.meta.match_really_occupied()) {
                let value = unsafe { ptr::read(self.element(pos, n)) };
                pg.meta.reset(n);
                self.size.fetch_sub(1, Ordering::Relaxed);
                f(value);
            }
        }
    }

    /// Drops every element and resets all metadata. Exclusive table
    /// access required.
    pub(crate) fn clear_exclusive(&mut self) {
        for pos in 0..self.groups_len() {
            let pg = &self.groups[pos];
            for n in BitMaskIter::new(pg.meta.match_really_occupied()) {
                unsafe { ptr::drop_in_place(self.element(pos, n)) };
            }
            pg.meta.clear();
        }
        self.groups[self.groups_len() - 1].meta.set_sentinel();
        self.size.store(0, Ordering::Release);
    }
}

impl<T> Drop for RawConcurrentTable<T> {
    fn drop(&mut self) {
        if std::mem::needs_drop::<T>() {
            for pos in 0..self.groups_len() {
                for n in BitMaskIter::new(self.groups[pos].meta.match_really_occupied()) {
                    unsafe { ptr::drop_in_place(self.element(pos, n)) };
                }
            }
        }
    }
}
