use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use crate::foa::table::{RawIter, RawTable};
use crate::mix::{make_hash, DefaultHashBuilder};

/// Unique-key hash map with node storage.
///
/// Each entry is allocated on its own; the table slots hold the owning
/// pointers. Rehashing relocates the pointers but never the entries, so
/// references obtained through [`get`](NodeMap::get) stay valid until the
/// entry itself is removed. Costs one indirection per lookup relative to
/// [`Map`](crate::Map).
pub struct NodeMap<K, V, S = DefaultHashBuilder> {
    hash_builder: S,
    table: RawTable<Box<(K, V)>>,
}

impl<K, V> NodeMap<K, V, DefaultHashBuilder> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> NodeMap<K, V, S> {
    #[inline]
    pub fn with_hasher(hash_builder: S) -> Self {
        NodeMap { hash_builder, table: RawTable::new() }
    }

    #[inline]
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        NodeMap { hash_builder, table: RawTable::with_capacity(capacity) }
    }

    #[inline]
    pub fn hasher(&self) -> &S {
        &self.hash_builder
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
    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    #[inline]
    pub fn max_load(&self) -> usize {
        self.table.max_load()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.table.clear();
    }

    #[inline]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter { raw: unsafe { self.table.iter() }, marker: PhantomData }
    }
}

impl<K, V, S> NodeMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Inserts a key-value pair, returning the previous value if the key
    /// was already present. Replacement happens inside the existing node,
    /// so references to the old value observe the new one.
    #[inline]
    pub fn insert(&mut self, k: K, v: V) -> Option<V> {
        let hash = make_hash(&self.hash_builder, &k);
        if let Some(loc) = self.table.find(hash, |x| k.eq(&x.0)) {
            return Some(std::mem::replace(unsafe { &mut (*loc.p).1 }, v));
        }
        let hash_builder = &self.hash_builder;
        self.table.insert_unique(hash, Box::new((k, v)), |x| make_hash(hash_builder, &x.0));
        None
    }

    #[inline]
    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = make_hash(&self.hash_builder, k);
        self.table.find(hash, |x| k.eq(x.0.borrow())).map(|loc| unsafe { &(*loc.p).1 })
    }

    #[inline]
    pub fn get_mut<Q>(&mut self, k: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = make_hash(&self.hash_builder, k);
        self.table.find(hash, |x| k.eq(x.0.borrow())).map(|loc| unsafe { &mut (*loc.p).1 })
    }

    #[inline]
    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = make_hash(&self.hash_builder, k);
        self.table.find(hash, |x| k.eq(x.0.borrow())).is_some()
    }

    pub fn remove<Q>(&mut self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = make_hash(&self.hash_builder, k);
        let loc = self.table.find(hash, |x| k.eq(x.0.borrow()))?;
        unsafe {
            let node = std::ptr::read(loc.p);
            self.table.erase_no_drop(loc.pg, loc.n);
            Some((*node).1)
        }
    }

    pub fn reserve(&mut self, n: usize) {
        let hash_builder = &self.hash_builder;
        self.table.reserve(n, |x| make_hash(hash_builder, &x.0));
    }

    pub fn rehash(&mut self, n: usize) {
        let hash_builder = &self.hash_builder;
        self.table.rehash(n, |x| make_hash(hash_builder, &x.0));
    }

    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        unsafe {
            self.table.retain_slots(|p| {
                let node = &mut **p;
                f(&node.0, &mut node.1)
            });
        }
    }
}

impl<K, V, S: Default> Default for NodeMap<K, V, S> {
    #[inline]
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Extend<(K, V)> for NodeMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for NodeMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = NodeMap::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

impl<K, V, S> fmt::Debug for NodeMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Borrowing iterator over a [`NodeMap`].
pub struct Iter<'a, K, V> {
    raw: RawIter<Box<(K, V)>>,
    marker: PhantomData<&'a (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next().map(|p| unsafe {
            let node = &**p;
            (&node.0, &node.1)
        })
    }
}

impl<'a, K, V, S> IntoIterator for &'a NodeMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    #[inline]
    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}
