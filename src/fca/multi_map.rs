use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use crate::fca::table::{RawFcaIter, RawFcaTable, Run};
use crate::mix::{make_hash, DefaultHashBuilder};

/// Multi-key hash map over the closed-addressing engine.
///
/// A key may appear any number of times; its entries sit adjacent in
/// their bucket so [`get_all`](MultiMap::get_all) walks a contiguous run
/// and [`remove_all`](MultiMap::remove_all) unlinks the run in O(1) per
/// entry. Values are node-allocated and never move on rehash.
pub struct MultiMap<K, V, S = DefaultHashBuilder> {
    hash_builder: S,
    table: RawFcaTable<(K, V)>,
}

impl<K, V> MultiMap<K, V, DefaultHashBuilder> {
    /// Creates an empty map; buckets are allocated on first insertion.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> MultiMap<K, V, S> {
    #[inline]
    pub fn with_hasher(hash_builder: S) -> Self {
        MultiMap { hash_builder, table: RawFcaTable::new() }
    }

    #[inline]
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        MultiMap { hash_builder, table: RawFcaTable::with_capacity(capacity) }
    }

    #[inline]
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Total number of entries, duplicates included.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    #[inline]
    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    #[inline]
    pub fn max_load_factor(&self) -> f32 {
        self.table.max_load_factor()
    }

    #[inline]
    pub fn set_max_load_factor(&mut self, mlf: f32) {
        self.table.set_max_load_factor(mlf);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Iterates all entries; entries with equal keys come out adjacent.
    #[inline]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter { raw: self.table.iter(), table: &self.table }
    }

    #[inline]
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    #[inline]
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }
}

impl<K, V, S> MultiMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    #[inline]
    fn hash_key<Q: Hash + ?Sized>(&self, k: &Q) -> u64 {
        make_hash(&self.hash_builder, k)
    }

    /// Inserts an entry; equal keys accumulate.
    #[inline]
    pub fn insert(&mut self, k: K, v: V) {
        let hash = self.hash_key(&k);
        self.table.insert_equiv(hash, (k, v), |stored, new| stored.0 == new.0);
    }

    /// Some value for the key (the most recently inserted one).
    #[inline]
    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let run = self.find(k)?;
        // the run's first node is its oldest entry; newer ones sit right
        // after it, so first.next is the latest unless the run is a
        // singleton
        let idx = if run.first == run.last { run.first } else { self.table.node_next(run.first) };
        Some(unsafe { &self.table.value(idx).1 })
    }

    /// Mutable access to some value for the key.
    #[inline]
    pub fn get_mut<Q>(&mut self, k: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let run = self.find(k)?;
        let idx = if run.first == run.last { run.first } else { self.table.node_next(run.first) };
        Some(unsafe { &mut self.table.value_mut(idx).1 })
    }

    /// All values for the key, as a contiguous run.
    #[inline]
    pub fn get_all<'a, Q>(&'a self, k: &Q) -> ValuesOf<'a, K, V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        ValuesOf { table: &self.table, run: self.find(k), done: false }
    }

    /// Number of entries stored under the key.
    #[inline]
    pub fn count<Q>(&self, k: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.find(k) {
            Some(run) => self.table.run_len(run),
            None => 0,
        }
    }

    #[inline]
    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(k).is_some()
    }

    /// Removes every entry under the key; returns how many went.
    #[inline]
    pub fn remove_all<Q>(&mut self, k: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_key(k);
        self.table.erase_run(hash, |stored| k.eq(stored.0.borrow()))
    }

    /// Ensures at least `n` buckets.
    pub fn rehash(&mut self, n: usize) {
        self.table.rehash(n);
    }

    /// Ensures capacity for `n` entries in total.
    pub fn reserve(&mut self, n: usize) {
        self.table.reserve(n);
    }

    /// Moves every entry of `other` into `self`.
    pub fn merge<S2: BuildHasher>(&mut self, other: &mut MultiMap<K, V, S2>) {
        while let Some((k, v)) = other.table.pop_first() {
            self.insert(k, v);
        }
    }

    #[inline]
    fn find<Q>(&self, k: &Q) -> Option<Run>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_key(k);
        self.table.find_run(hash, |stored| k.eq(stored.0.borrow()))
    }
}

impl<K, V, S: Default> Default for MultiMap<K, V, S> {
    #[inline]
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Extend<(K, V)> for MultiMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let it = iter.into_iter();
        self.reserve(self.len() + it.size_hint().0);
        for (k, v) in it {
            self.insert(k, v);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for MultiMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = MultiMap::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

impl<K, V, S> fmt::Debug for MultiMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Borrowing iterator over all entries of a [`MultiMap`].
pub struct Iter<'a, K, V> {
    raw: RawFcaIter<'a, (K, V)>,
    table: &'a RawFcaTable<(K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.raw.next()?;
        let entry = unsafe { self.table.value(idx) };
        Some((&entry.0, &entry.1))
    }
}

impl<'a, K, V, S> IntoIterator for &'a MultiMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    #[inline]
    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

/// Iterator over the values stored under a single key.
pub struct ValuesOf<'a, K, V> {
    table: &'a RawFcaTable<(K, V)>,
    run: Option<Run>,
    done: bool,
}

impl<'a, K, V> Iterator for ValuesOf<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        if self.done {
            return None;
        }
        let run = self.run?;
        let idx = run.first;
        if idx == run.last {
            self.done = true;
        } else {
            self.run = Some(Run { first: self.table.node_next(idx), last: run.last });
        }
        Some(unsafe { &self.table.value(idx).1 })
    }
}
