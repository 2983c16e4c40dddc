use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use crate::foa::table::{RawIter, RawTable};
use crate::mix::{make_hash, DefaultHashBuilder};

/// Unique-key hash set with node storage: values are individually
/// allocated and never move once inserted, so references from
/// [`get`](NodeSet::get) survive rehashing.
pub struct NodeSet<T, S = DefaultHashBuilder> {
    hash_builder: S,
    table: RawTable<Box<T>>,
}

impl<T> NodeSet<T, DefaultHashBuilder> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<T, S> NodeSet<T, S> {
    #[inline]
    pub fn with_hasher(hash_builder: S) -> Self {
        NodeSet { hash_builder, table: RawTable::new() }
    }

    #[inline]
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        NodeSet { hash_builder, table: RawTable::with_capacity(capacity) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.table.clear();
    }

    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { raw: unsafe { self.table.iter() }, marker: PhantomData }
    }
}

impl<T, S> NodeSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher,
{
    /// Inserts a value; returns whether it was newly added.
    #[inline]
    pub fn insert(&mut self, value: T) -> bool {
        let hash = make_hash(&self.hash_builder, &value);
        if self.table.find(hash, |x| value.eq(x)).is_some() {
            return false;
        }
        let hash_builder = &self.hash_builder;
        self.table.insert_unique(hash, Box::new(value), |x| make_hash(hash_builder, &**x));
        true
    }

    #[inline]
    pub fn get<Q>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = make_hash(&self.hash_builder, value);
        self.table.find(hash, |x| value.eq((**x).borrow())).map(|loc| unsafe { &*(*loc.p) })
    }

    #[inline]
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(value).is_some()
    }

    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = make_hash(&self.hash_builder, value);
        match self.table.find(hash, |x| value.eq((**x).borrow())) {
            Some(loc) => unsafe {
                let node = std::ptr::read(loc.p);
                self.table.erase_no_drop(loc.pg, loc.n);
                drop(node);
                true
            },
            None => false,
        }
    }

    pub fn reserve(&mut self, n: usize) {
        let hash_builder = &self.hash_builder;
        self.table.reserve(n, |x| make_hash(hash_builder, &**x));
    }

    pub fn rehash(&mut self, n: usize) {
        let hash_builder = &self.hash_builder;
        self.table.rehash(n, |x| make_hash(hash_builder, &**x));
    }
}

impl<T, S: Default> Default for NodeSet<T, S> {
    #[inline]
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<T, S> Extend<T> for NodeSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for v in iter {
            self.insert(v);
        }
    }
}

impl<T, S> FromIterator<T> for NodeSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = NodeSet::with_hasher(S::default());
        set.extend(iter);
        set
    }
}

impl<T, S> fmt::Debug for NodeSet<T, S>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Borrowing iterator over a [`NodeSet`].
pub struct Iter<'a, T> {
    raw: RawIter<Box<T>>,
    marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<&'a T> {
        self.raw.next().map(|p| unsafe { &**p })
    }
}
