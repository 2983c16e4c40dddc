use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use crate::fca::table::{RawFcaIter, RawFcaTable, Run};
use crate::mix::{make_hash, DefaultHashBuilder};

/// Multi-key hash set over the closed-addressing engine: equal values may
/// be stored repeatedly and sit adjacent in their bucket.
pub struct MultiSet<T, S = DefaultHashBuilder> {
    hash_builder: S,
    table: RawFcaTable<T>,
}

impl<T> MultiSet<T, DefaultHashBuilder> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<T, S> MultiSet<T, S> {
    #[inline]
    pub fn with_hasher(hash_builder: S) -> Self {
        MultiSet { hash_builder, table: RawFcaTable::new() }
    }

    #[inline]
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        MultiSet { hash_builder, table: RawFcaTable::with_capacity(capacity) }
    }

    /// Total number of stored values, duplicates included.
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

    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { raw: self.table.iter(), table: &self.table }
    }
}

impl<T, S> MultiSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher,
{
    #[inline]
    pub fn insert(&mut self, value: T) {
        let hash = make_hash(&self.hash_builder, &value);
        self.table.insert_equiv(hash, value, |stored, new| stored == new);
    }

    #[inline]
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(value).is_some()
    }

    /// How many copies of `value` are stored.
    #[inline]
    pub fn count<Q>(&self, value: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.find(value) {
            Some(run) => self.table.run_len(run),
            None => 0,
        }
    }

    /// Removes every copy of `value`; returns how many went.
    #[inline]
    pub fn remove_all<Q>(&mut self, value: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = make_hash(&self.hash_builder, value);
        self.table.erase_run(hash, |stored| value.eq(stored.borrow()))
    }

    pub fn rehash(&mut self, n: usize) {
        self.table.rehash(n);
    }

    pub fn reserve(&mut self, n: usize) {
        self.table.reserve(n);
    }

    /// Moves every value of `other` into `self`.
    pub fn merge<S2: BuildHasher>(&mut self, other: &mut MultiSet<T, S2>) {
        while let Some(v) = other.table.pop_first() {
            self.insert(v);
        }
    }

    #[inline]
    fn find<Q>(&self, value: &Q) -> Option<Run>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = make_hash(&self.hash_builder, value);
        self.table.find_run(hash, |stored| value.eq(stored.borrow()))
    }
}

impl<T, S: Default> Default for MultiSet<T, S> {
    #[inline]
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<T, S> Extend<T> for MultiSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let it = iter.into_iter();
        self.reserve(self.len() + it.size_hint().0);
        for v in it {
            self.insert(v);
        }
    }
}

impl<T, S> FromIterator<T> for MultiSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = MultiSet::with_hasher(S::default());
        set.extend(iter);
        set
    }
}

impl<T, S> fmt::Debug for MultiSet<T, S>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Borrowing iterator over all values of a [`MultiSet`].
pub struct Iter<'a, T> {
    raw: RawFcaIter<'a, T>,
    table: &'a RawFcaTable<T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<&'a T> {
        let idx = self.raw.next()?;
        Some(unsafe { self.table.value(idx) })
    }
}

impl<'a, T, S> IntoIterator for &'a MultiSet<T, S> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    #[inline]
    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
