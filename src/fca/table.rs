use crate::fca::arena::{Arena, NONE};
use crate::fca::group::{
    reset_bit, reset_first_bits, set_bit, BucketGroup, GROUP_WIDTH,
};
use crate::policy::PrimeFmodSizePolicy;

/// A raw separate-chaining table with bucket-group-accelerated iteration.
///
/// `buckets` holds one chain head per bucket plus a permanently empty
/// dummy bucket at index `size` acting as the end-of-iteration mark.
/// `groups` holds `size / GROUP_WIDTH + 1` bucket groups, the last one
/// being the sentinel: its bitmask always carries bit `size % GROUP_WIDTH`
/// (the dummy bucket) and it is never unlinked from the circular list of
/// occupied groups.
///
/// Equal-key nodes form contiguous runs inside their chain, circularly
/// linked through `group_prev`. Keys never repeat across runs.
pub(crate) struct RawFcaTable<T> {
    arena: Arena<T>,
    buckets: Vec<u32>,
    groups: Vec<BucketGroup>,
    size_index: usize,
    /// Bucket count (a prime); 0 while unallocated.
    size: usize,
    mlf: f32,
    ml: usize,
}

/// Bounds of an equivalence run: both ends inclusive.
#[derive(Clone, Copy)]
pub(crate) struct Run {
    pub(crate) first: u32,
    pub(crate) last: u32,
}

impl<T> RawFcaTable<T> {
    pub(crate) fn new() -> Self {
        RawFcaTable {
            arena: Arena::new(),
            buckets: Vec::new(),
            groups: Vec::new(),
            size_index: 0,
            size: 0,
            mlf: 1.0,
            ml: 0,
        }
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut table = Self::new();
        if capacity > 0 {
            table.arena = Arena::with_capacity(capacity);
            let buckets = (capacity as f64 / table.mlf as f64).ceil() as usize;
            table.allocate(PrimeFmodSizePolicy::size_index(buckets));
        }
        table
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    pub(crate) fn bucket_count(&self) -> usize {
        self.size
    }

    #[inline]
    pub(crate) fn max_load_factor(&self) -> f32 {
        self.mlf
    }

    pub(crate) fn set_max_load_factor(&mut self, mlf: f32) {
        assert!(mlf > 0.0, "max load factor must be positive");
        self.mlf = mlf;
        self.ml = (self.size as f64 * mlf as f64) as usize;
    }

    pub(crate) fn load_factor(&self) -> f32 {
        if self.size == 0 {
            0.0
        } else {
            self.len() as f32 / self.size as f32
        }
    }

    #[inline]
    fn position(&self, hash: u64) -> usize {
        PrimeFmodSizePolicy::position(hash, self.size_index)
    }

    /// Builds fresh bucket and group arrays for the given size index and
    /// installs them; the caller relinks any existing nodes.
    fn allocate(&mut self, size_index: usize) {
        let size = PrimeFmodSizePolicy::size(size_index);
        let num_groups = size / GROUP_WIDTH + 1;
        let mut groups: Vec<BucketGroup> =
            (0..num_groups).map(|i| BucketGroup::new((i * GROUP_WIDTH) as u32)).collect();

        // the sentinel group links in on itself and permanently owns the
        // dummy bucket's bit
        let last = num_groups - 1;
        groups[last].bitmask = set_bit(size % GROUP_WIDTH);
        groups[last].next = last as u32;
        groups[last].prev = last as u32;

        self.buckets = vec![NONE; size + 1];
        self.groups = groups;
        self.size_index = size_index;
        self.size = size;
        self.ml = (size as f64 * self.mlf as f64) as usize;
    }

    /// Splices a bucket's group into the occupied list if this is the
    /// bucket's first node, and records the bucket's bit.
    fn link_bucket(&mut self, bucket: usize) {
        let g = bucket / GROUP_WIDTH;
        if self.groups[g].bitmask == 0 {
            let root = self.groups.len() - 1;
            let next = self.groups[root].next;
            self.groups[g].next = next;
            self.groups[g].prev = root as u32;
            self.groups[next as usize].prev = g as u32;
            self.groups[root].next = g as u32;
        }
        self.groups[g].bitmask |= set_bit(bucket % GROUP_WIDTH);
    }

    /// Clears a bucket's bit after its chain emptied; a group with no
    /// occupied buckets left is unlinked. The sentinel group keeps the
    /// dummy bucket's bit and thus never unlinks.
    fn unlink_bucket(&mut self, bucket: usize) {
        let g = bucket / GROUP_WIDTH;
        self.groups[g].bitmask &= reset_bit(bucket % GROUP_WIDTH);
        if self.groups[g].bitmask == 0 {
            let next = self.groups[g].next;
            let prev = self.groups[g].prev;
            self.groups[next as usize].prev = prev;
            self.groups[prev as usize].next = next;
            self.groups[g].next = NONE;
            self.groups[g].prev = NONE;
        }
    }

    /// First occupied bucket strictly after `bucket` in iteration order;
    /// the dummy bucket (`== size`) means the end was reached.
    pub(crate) fn next_occupied_bucket(&self, bucket: usize) -> usize {
        let g = bucket / GROUP_WIDTH;
        let offset = bucket % GROUP_WIDTH;
        let masked = self.groups[g].bitmask & reset_first_bits(offset + 1);
        let n = masked.trailing_zeros() as usize;
        if n < GROUP_WIDTH {
            self.groups[g].base as usize + n
        } else {
            let ng = self.groups[g].next as usize;
            let n = self.groups[ng].bitmask.trailing_zeros() as usize;
            self.groups[ng].base as usize + n
        }
    }

    /// The first occupied bucket, or the dummy bucket when empty.
    pub(crate) fn first_bucket(&self) -> usize {
        debug_assert!(self.size > 0);
        self.next_occupied_bucket(self.size)
    }

    /// Finds the run whose first node's key satisfies `eq`. Chain search
    /// skips whole runs: a run's first node links to its last through
    /// `group_prev`, so mismatching keys cost one comparison each.
    pub(crate) fn find_run(&self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<Run> {
        if self.size == 0 {
            return None;
        }
        let bucket = self.position(hash);
        let mut cur = self.buckets[bucket];
        while cur != NONE {
            let node = self.arena.node(cur);
            let last = node.group_prev;
            if node.hash == hash && eq(unsafe { self.arena.value(cur) }) {
                return Some(Run { first: cur, last });
            }
            cur = self.arena.node(last).next;
        }
        None
    }

    /// Number of nodes in a run.
    pub(crate) fn run_len(&self, run: Run) -> usize {
        let mut count = 1;
        let mut cur = run.first;
        while cur != run.last {
            cur = self.arena.node(cur).next;
            count += 1;
        }
        count
    }

    /// # Safety
    /// `idx` must be live.
    #[inline]
    pub(crate) unsafe fn value(&self, idx: u32) -> &T {
        self.arena.value(idx)
    }

    /// # Safety
    /// `idx` must be live.
    #[inline]
    pub(crate) unsafe fn value_mut(&mut self, idx: u32) -> &mut T {
        self.arena.value_mut(idx)
    }

    #[inline]
    pub(crate) fn node_next(&self, idx: u32) -> u32 {
        self.arena.node(idx).next
    }

    /// Inserts a value, placing it adjacent to any equal keys.
    /// `eq` compares a stored element against the incoming one.
    pub(crate) fn insert_equiv(
        &mut self,
        hash: u64,
        value: T,
        mut eq: impl FnMut(&T, &T) -> bool,
    ) -> u32 {
        self.reserve_for_insert(1);
        let bucket = self.position(hash);
        let found = self.find_run(hash, |stored| eq(stored, &value));
        let idx = self.arena.alloc(hash, value);
        match found {
            Some(run) => {
                // keep the run contiguous: the new node goes right after
                // its first node
                let first_next = self.arena.node(run.first).next;
                self.arena.node_mut(idx).next = first_next;
                self.arena.node_mut(run.first).next = idx;
                if run.last == run.first {
                    self.arena.node_mut(run.first).group_prev = idx;
                    self.arena.node_mut(idx).group_prev = run.first;
                } else {
                    self.arena.node_mut(idx).group_prev = run.first;
                    self.arena.node_mut(first_next).group_prev = idx;
                }
            }
            None => {
                self.link_bucket(bucket);
                self.arena.node_mut(idx).next = self.buckets[bucket];
                self.arena.node_mut(idx).group_prev = idx;
                self.buckets[bucket] = idx;
            }
        }
        idx
    }

    /// Unlinks and frees a key's whole run; returns how many nodes went.
    pub(crate) fn erase_run(&mut self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> usize {
        if self.size == 0 {
            return 0;
        }
        let bucket = self.position(hash);
        // track the node whose `next` points at the current run
        let mut pred = NONE;
        let mut cur = self.buckets[bucket];
        let run = loop {
            if cur == NONE {
                return 0;
            }
            let node = self.arena.node(cur);
            let last = node.group_prev;
            if node.hash == hash && eq(unsafe { self.arena.value(cur) }) {
                break Run { first: cur, last };
            }
            pred = last;
            cur = self.arena.node(last).next;
        };

        let after = self.arena.node(run.last).next;
        if pred == NONE {
            self.buckets[bucket] = after;
        } else {
            self.arena.node_mut(pred).next = after;
        }

        let mut count = 0;
        let mut n = run.first;
        loop {
            let next = self.arena.node(n).next;
            unsafe { self.arena.drop_value(n) };
            count += 1;
            if n == run.last {
                break;
            }
            n = next;
        }
        if self.buckets[bucket] == NONE {
            self.unlink_bucket(bucket);
        }
        count
    }

    /// Takes one value out of the table (the head of the first occupied
    /// bucket); `None` when empty.
    pub(crate) fn pop_first(&mut self) -> Option<T> {
        if self.size == 0 || self.len() == 0 {
            return None;
        }
        let bucket = self.first_bucket();
        debug_assert!(bucket < self.size);
        let head = self.buckets[bucket];
        let last = self.arena.node(head).group_prev;
        let next = self.arena.node(head).next;
        if last == head {
            // singleton run
            self.buckets[bucket] = next;
        } else {
            // the second node becomes its run's first
            self.arena.node_mut(next).group_prev = last;
            self.buckets[bucket] = next;
        }
        let value = unsafe { self.arena.free(head) };
        if self.buckets[bucket] == NONE {
            self.unlink_bucket(bucket);
        }
        Some(value)
    }

    /// Grows, if needed, so `extra` more nodes respect the load factor.
    fn reserve_for_insert(&mut self, extra: usize) {
        let needed = self.len() + extra;
        if self.size == 0 {
            let buckets = ((needed as f64 / self.mlf as f64).ceil() as usize).max(1);
            self.allocate(PrimeFmodSizePolicy::size_index(buckets));
            return;
        }
        if needed > self.ml {
            let buckets = (needed as f64 / self.mlf as f64).ceil() as usize;
            let index = PrimeFmodSizePolicy::size_index(buckets);
            if index != self.size_index {
                self.rehash_to_index(index);
            }
        }
    }

    /// Ensures at least `buckets` buckets (and never fewer than the load
    /// factor demands for the current node count).
    pub(crate) fn rehash(&mut self, buckets: usize) {
        let floor = (self.len() as f64 / self.mlf as f64).ceil() as usize;
        let index = PrimeFmodSizePolicy::size_index(buckets.max(floor).max(1));
        if self.size == 0 {
            self.allocate(index);
        } else if index != self.size_index {
            self.rehash_to_index(index);
        }
    }

    /// Ensures capacity for `n` nodes in total.
    pub(crate) fn reserve(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if n > self.ml || self.size == 0 {
            let buckets = ((n as f64 / self.mlf as f64).ceil() as usize).max(1);
            let index = PrimeFmodSizePolicy::size_index(buckets);
            if self.size == 0 {
                self.allocate(index);
            } else if index != self.size_index {
                self.rehash_to_index(index);
            }
        }
    }

    /// Rebuckets every node into fresh arrays. Runs move as a unit (their
    /// `group_prev` cycle is untouched) and node values never move; the
    /// cached hashes make the whole pass hasher-free and thus non-failing
    /// once the new arrays exist.
    fn rehash_to_index(&mut self, new_index: usize) {
        let old_buckets = std::mem::take(&mut self.buckets);
        let old_size = self.size;
        self.allocate(new_index);
        for &head in old_buckets.iter().take(old_size) {
            let mut cur = head;
            while cur != NONE {
                let first = cur;
                let last = self.arena.node(first).group_prev;
                let after = self.arena.node(last).next;
                let pos = PrimeFmodSizePolicy::position(self.arena.node(first).hash, new_index);
                self.link_bucket(pos);
                self.arena.node_mut(last).next = self.buckets[pos];
                self.buckets[pos] = first;
                cur = after;
            }
        }
    }

    /// Drops every value and resets the arrays, keeping the bucket count.
    pub(crate) fn clear(&mut self) {
        if self.size == 0 {
            return;
        }
        for bucket in 0..self.size {
            let mut cur = self.buckets[bucket];
            while cur != NONE {
                let next = self.arena.node(cur).next;
                unsafe { self.arena.drop_value(cur) };
                cur = next;
            }
            self.buckets[bucket] = NONE;
        }
        self.arena.reset();
        let index = self.size_index;
        self.allocate(index);
    }

    /// Iterator over all live nodes, runs and buckets in group order.
    pub(crate) fn iter(&self) -> RawFcaIter<'_, T> {
        if self.size == 0 || self.len() == 0 {
            return RawFcaIter { table: self, node: NONE, bucket: 0 };
        }
        let bucket = self.first_bucket();
        if bucket == self.size {
            RawFcaIter { table: self, node: NONE, bucket }
        } else {
            RawFcaIter { table: self, node: self.buckets[bucket], bucket }
        }
    }

    #[cfg(test)]
    pub(crate) fn check_group_list_invariant(&self) {
        if self.size == 0 {
            return;
        }
        // every group with a non-zero bitmask is reachable from the
        // sentinel, every linked group has a non-zero bitmask, and the
        // sentinel always carries the dummy bucket's bit
        let root = self.groups.len() - 1;
        assert_ne!(self.groups[root].bitmask & set_bit(self.size % GROUP_WIDTH), 0);
        let mut reachable = vec![false; self.groups.len()];
        let mut g = root;
        loop {
            assert!(self.groups[g].bitmask != 0);
            reachable[g] = true;
            let next = self.groups[g].next as usize;
            assert_eq!(self.groups[next].prev as usize, g);
            g = next;
            if g == root {
                break;
            }
        }
        for (i, group) in self.groups.iter().enumerate() {
            if i == root {
                continue;
            }
            assert_eq!(
                reachable[i],
                group.bitmask != 0,
                "group {} linkage does not match its bitmask",
                i
            );
        }
    }
}

impl<T> Drop for RawFcaTable<T> {
    fn drop(&mut self) {
        if self.size != 0 && std::mem::needs_drop::<T>() {
            for bucket in 0..self.size {
                let mut cur = self.buckets[bucket];
                while cur != NONE {
                    let next = self.arena.node(cur).next;
                    unsafe { self.arena.drop_value(cur) };
                    cur = next;
                }
            }
        }
    }
}

/// Iterator over every live node index.
pub(crate) struct RawFcaIter<'a, T> {
    table: &'a RawFcaTable<T>,
    node: u32,
    bucket: usize,
}

impl<'a, T> Iterator for RawFcaIter<'a, T> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.node == NONE {
            return None;
        }
        let current = self.node;
        let next = self.table.arena.node(current).next;
        if next != NONE {
            self.node = next;
        } else {
            let bucket = self.table.next_occupied_bucket(self.bucket);
            if bucket == self.table.size {
                self.node = NONE;
            } else {
                self.bucket = bucket;
                self.node = self.table.buckets[bucket];
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mix::{make_hash, DefaultHashBuilder};

    fn h(k: u64) -> u64 {
        make_hash(&DefaultHashBuilder::default(), &k)
    }

    fn insert(table: &mut RawFcaTable<(u64, u64)>, k: u64, v: u64) {
        table.insert_equiv(h(k), (k, v), |a, b| a.0 == b.0);
    }

    #[test]
    fn empty_table_behaves() {
        let table: RawFcaTable<(u64, u64)> = RawFcaTable::new();
        assert_eq!(table.len(), 0);
        assert_eq!(table.bucket_count(), 0);
        assert!(table.find_run(h(1), |x| x.0 == 1).is_none());
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn first_allocation_uses_smallest_prime() {
        let mut table: RawFcaTable<(u64, u64)> = RawFcaTable::new();
        insert(&mut table, 1, 10);
        assert_eq!(table.bucket_count(), 13);
    }

    #[test]
    fn equal_keys_stay_adjacent() {
        let mut table: RawFcaTable<(u64, u64)> = RawFcaTable::new();
        for i in 0..50 {
            insert(&mut table, i, i);
        }
        insert(&mut table, 7, 100);
        insert(&mut table, 7, 200);
        insert(&mut table, 7, 300);
        let run = table.find_run(h(7), |x| x.0 == 7).unwrap();
        assert_eq!(table.run_len(run), 4);
        // walking first..=last must only see key 7
        let mut cur = run.first;
        loop {
            assert_eq!(unsafe { table.value(cur) }.0, 7);
            if cur == run.last {
                break;
            }
            cur = table.node_next(cur);
        }
        table.check_group_list_invariant();
    }

    #[test]
    fn erase_run_removes_all_equivalents() {
        let mut table: RawFcaTable<(u64, u64)> = RawFcaTable::new();
        for i in 0..20 {
            insert(&mut table, i, i);
        }
        for v in 0..5 {
            insert(&mut table, 3, 100 + v);
        }
        assert_eq!(table.len(), 25);
        assert_eq!(table.erase_run(h(3), |x| x.0 == 3), 6);
        assert_eq!(table.len(), 19);
        assert!(table.find_run(h(3), |x| x.0 == 3).is_none());
        assert_eq!(table.erase_run(h(3), |x| x.0 == 3), 0);
        table.check_group_list_invariant();
    }

    #[test]
    fn iteration_covers_every_node_exactly_once() {
        let mut table: RawFcaTable<(u64, u64)> = RawFcaTable::new();
        for i in 0..300 {
            insert(&mut table, i, i * 2);
        }
        let mut keys: Vec<u64> =
            table.iter().map(|idx| unsafe { table.value(idx) }.0).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..300).collect::<Vec<_>>());
    }

    #[test]
    fn rehash_keeps_runs_and_grows_primes() {
        let mut table: RawFcaTable<(u64, u64)> = RawFcaTable::new();
        for i in 0..200 {
            insert(&mut table, i % 40, i);
        }
        assert!(table.bucket_count() >= 193);
        let run = table.find_run(h(11), |x| x.0 == 11).unwrap();
        assert_eq!(table.run_len(run), 5);
        table.check_group_list_invariant();

        let before = table.bucket_count();
        table.rehash(before);
        assert_eq!(table.bucket_count(), before);
    }

    #[test]
    fn unlink_tracks_emptied_groups() {
        let mut table: RawFcaTable<(u64, u64)> = RawFcaTable::new();
        for i in 0..100 {
            insert(&mut table, i, i);
        }
        for i in 0..100 {
            table.erase_run(h(i), |x| x.0 == i);
        }
        assert_eq!(table.len(), 0);
        assert_eq!(table.iter().count(), 0);
        table.check_group_list_invariant();
    }

    #[test]
    fn pop_first_drains_the_table() {
        let mut table: RawFcaTable<(u64, u64)> = RawFcaTable::new();
        for i in 0..64 {
            insert(&mut table, i, i);
        }
        insert(&mut table, 10, 999);
        let mut drained = Vec::new();
        while let Some(v) = table.pop_first() {
            drained.push(v);
        }
        assert_eq!(drained.len(), 65);
        assert_eq!(table.len(), 0);
        table.check_group_list_invariant();
    }

    #[test]
    fn clear_retains_bucket_count() {
        let mut table: RawFcaTable<(u64, u64)> = RawFcaTable::new();
        for i in 0..100 {
            insert(&mut table, i, i);
        }
        let buckets = table.bucket_count();
        table.clear();
        assert_eq!(table.len(), 0);
        assert_eq!(table.bucket_count(), buckets);
        insert(&mut table, 1, 1);
        assert_eq!(table.len(), 1);
    }
}
