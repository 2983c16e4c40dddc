use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::ops::Index;

use crate::foa::table::{RawIter, RawTable};
use crate::mix::{make_hash, DefaultHashBuilder};

/// Unique-key hash map with flat storage.
///
/// Entries live directly in the table's element slots: lookups touch one
/// cache line of metadata plus the entry itself, but any growth or
/// [`rehash`](Map::rehash) moves entries and invalidates references into
/// the map. Use [`NodeMap`](crate::NodeMap) when value addresses must
/// survive rehashing.
pub struct Map<K, V, S = DefaultHashBuilder> {
    hash_builder: S,
    table: RawTable<(K, V)>,
}

impl<K, V> Map<K, V, DefaultHashBuilder> {
    /// Creates an empty map. No memory is allocated until the first
    /// insertion.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map holding at least `capacity` elements without
    /// reallocating.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> Map<K, V, S> {
    /// Creates an empty map which will use the given hash builder.
    ///
    /// Warning: hash builders are normally randomly seeded to resist
    /// collision-flooding attacks; supplying a fixed one trades that away.
    #[inline]
    pub fn with_hasher(hash_builder: S) -> Self {
        Map { hash_builder, table: RawTable::new() }
    }

    #[inline]
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Map { hash_builder, table: RawTable::with_capacity(capacity) }
    }

    /// Returns a reference to the map's [`BuildHasher`].
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

    /// Element slots currently addressable without growing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    #[inline]
    pub fn load_factor(&self) -> f32 {
        self.table.load_factor()
    }

    /// Elements the map holds before the next insertion grows it.
    #[inline]
    pub fn max_load(&self) -> usize {
        self.table.max_load()
    }

    #[inline]
    pub fn max_load_factor(&self) -> f32 {
        self.table.max_load_factor()
    }

    /// Sets the maximum load factor, in `(0, 1]`. Takes effect on the
    /// next growth decision.
    #[inline]
    pub fn set_max_load_factor(&mut self, mlf: f32) {
        self.table.set_max_load_factor(mlf);
    }

    /// Removes all entries, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Iterates over all entries in unspecified order.
    #[inline]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter { raw: unsafe { self.table.iter() }, marker: PhantomData }
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

impl<K, V, S> Map<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    #[inline]
    fn hash_key<Q: Hash + ?Sized>(&self, k: &Q) -> u64 {
        make_hash(&self.hash_builder, k)
    }

    /// Inserts a key-value pair, returning the previous value if the key
    /// was already present.
    #[inline]
    pub fn insert(&mut self, k: K, v: V) -> Option<V> {
        let hash = self.hash_key(&k);
        if let Some(loc) = self.table.find(hash, |x| k.eq(&x.0)) {
            return Some(std::mem::replace(unsafe { &mut (*loc.p).1 }, v));
        }
        let hash_builder = &self.hash_builder;
        self.table.insert_unique(hash, (k, v), |x| make_hash(hash_builder, &x.0));
        None
    }

    /// Returns the value for `k`, constructing and inserting it only if
    /// the key is absent. The boolean reports whether an insertion
    /// happened.
    #[inline]
    pub fn get_or_insert_with(&mut self, k: K, make: impl FnOnce() -> V) -> (&mut V, bool) {
        let hash = self.hash_key(&k);
        if let Some(loc) = self.table.find(hash, |x| k.eq(&x.0)) {
            return (unsafe { &mut (*loc.p).1 }, false);
        }
        let hash_builder = &self.hash_builder;
        let loc = self.table.insert_unique(hash, (k, make()), |x| make_hash(hash_builder, &x.0));
        (unsafe { &mut (*loc.p).1 }, true)
    }

    #[inline]
    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(k).map(|(_, v)| v)
    }

    #[inline]
    pub fn get_key_value<Q>(&self, k: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_key(k);
        self.table.find(hash, |x| k.eq(x.0.borrow())).map(|loc| unsafe {
            let (ref key, ref value) = *loc.p;
            (key, value)
        })
    }

    #[inline]
    pub fn get_mut<Q>(&mut self, k: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_key(k);
        self.table.find(hash, |x| k.eq(x.0.borrow())).map(|loc| unsafe { &mut (*loc.p).1 })
    }

    #[inline]
    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_key(k);
        self.table.find(hash, |x| k.eq(x.0.borrow())).is_some()
    }

    #[inline]
    pub fn remove<Q>(&mut self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(k).map(|(_, v)| v)
    }

    pub fn remove_entry<Q>(&mut self, k: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_key(k);
        let loc = self.table.find(hash, |x| k.eq(x.0.borrow()))?;
        unsafe {
            let entry = std::ptr::read(loc.p);
            self.table.erase_no_drop(loc.pg, loc.n);
            Some(entry)
        }
    }

    /// Ensures capacity for at least `n` elements in total.
    pub fn reserve(&mut self, n: usize) {
        let hash_builder = &self.hash_builder;
        self.table.reserve(n, |x| make_hash(hash_builder, &x.0));
    }

    /// Like [`Map::reserve`], but reports allocation failure instead of
    /// aborting.
    pub fn try_reserve(&mut self, n: usize) -> crate::Result<()> {
        let hash_builder = &self.hash_builder;
        self.table.try_reserve(n, |x| make_hash(hash_builder, &x.0))?;
        Ok(())
    }

    /// Rebuilds the table with capacity for at least `n` elements. A
    /// same-capacity rehash recomputes every slot in place, which also
    /// sheds overflow metadata accumulated by past erasures.
    pub fn rehash(&mut self, n: usize) {
        let hash_builder = &self.hash_builder;
        self.table.rehash(n, |x| make_hash(hash_builder, &x.0));
    }

    /// Keeps only the entries the predicate approves.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        unsafe {
            self.table.retain_slots(|p| {
                let entry = &mut *p;
                f(&entry.0, &mut entry.1)
            });
        }
    }

    /// Moves entries of `other` whose keys are absent here into `self`;
    /// entries with conflicting keys stay in `other`.
    pub fn merge<S2: BuildHasher>(&mut self, other: &mut Map<K, V, S2>) {
        let Map { hash_builder, table } = self;
        unsafe {
            other.table.drain_filter_map(|entry| {
                let hash = make_hash(hash_builder, &entry.0);
                if table.find(hash, |x| entry.0.eq(&x.0)).is_some() {
                    Some(entry)
                } else {
                    table.insert_unique(hash, entry, |x| make_hash(hash_builder, &x.0));
                    None
                }
            });
        }
    }
}

impl<K, V, S: Default> Default for Map<K, V, S> {
    #[inline]
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, Q, V, S> Index<&Q> for Map<K, V, S>
where
    K: Eq + Hash + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
{
    type Output = V;

    #[inline]
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

impl<K, V, S> Extend<(K, V)> for Map<K, V, S>
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

impl<K, V, S> FromIterator<(K, V)> for Map<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Map::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

impl<K, V, S> Clone for Map<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        let mut map = Map::with_capacity_and_hasher(self.len(), self.hash_builder.clone());
        for (k, v) in self.iter() {
            map.insert(k.clone(), v.clone());
        }
        map
    }
}

impl<K, V, S> fmt::Debug for Map<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> PartialEq for Map<K, V, S>
where
    K: Eq + Hash,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.iter().all(|(k, v)| other.get(k).map_or(false, |w| *v == *w))
    }
}

impl<K, V, S> Eq for Map<K, V, S>
where
    K: Eq + Hash,
    V: Eq,
    S: BuildHasher,
{
}

/// Borrowing iterator over a [`Map`].
pub struct Iter<'a, K, V> {
    raw: RawIter<(K, V)>,
    marker: PhantomData<&'a (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next().map(|p| unsafe {
            let (ref k, ref v) = *p;
            (k, v)
        })
    }
}

impl<'a, K, V, S> IntoIterator for &'a Map<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    #[inline]
    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}
