use std::hash::{BuildHasherDefault, Hasher};
use std::sync::Arc;

use grouptable::{ConcurrentMap, Map, MultiMap, NodeMap, Set};

/// Hasher returning integer keys unchanged; the containers' default
/// builder post-mixes it, which is the configuration cheap integer keys
/// are expected to run under.
#[derive(Default)]
struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | b as u64;
        }
    }

    fn write_u64(&mut self, i: u64) {
        self.0 = i;
    }

    fn write_usize(&mut self, i: usize) {
        self.0 = i as u64;
    }
}

type IdentityBuild = grouptable::mix::Mix<BuildHasherDefault<IdentityHasher>>;

#[test]
fn duplicate_aware_set_with_identity_hash() {
    let mut set: Set<u64, IdentityBuild> = Set::with_hasher(IdentityBuild::default());
    for v in [13u64, 29, 13, 53] {
        set.insert(v);
    }
    assert_eq!(set.len(), 3);
    assert!(set.contains(&13));
    assert!(set.contains(&29));
    assert!(set.contains(&53));
    assert!(!set.contains(&97));
}

#[test]
fn map_fills_to_capacity_then_halves_by_eviction() {
    let mut map: Map<u64, u64> = Map::with_capacity(1000);
    assert_eq!(map.max_load_factor(), 1.0);
    let capacity = map.capacity();
    for i in 1..=1000u64 {
        map.insert(i, i * 2);
    }
    // the capacity chosen up front holds all 1000 entries
    assert_eq!(map.capacity(), capacity);
    for i in 1..=1000u64 {
        assert_eq!(map[&i], 2 * i);
    }

    for i in (2..=1000u64).step_by(2) {
        assert_eq!(map.remove(&i), Some(2 * i));
    }
    assert_eq!(map.len(), 500);
    let mut keys: Vec<u64> = map.keys().copied().collect();
    keys.sort_unstable();
    assert_eq!(keys, (1..=1000u64).step_by(2).collect::<Vec<_>>());
}

#[test]
fn concurrent_disjoint_writers() {
    let threads = 8u64;
    let per_thread = 10_000u64;
    let map = Arc::new(ConcurrentMap::<u64, u64>::new());

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let map = Arc::clone(&map);
            std::thread::spawn(move || {
                let base = t * per_thread;
                for k in base..base + per_thread {
                    assert!(map.insert(k, k * k));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total = threads * per_thread;
    assert_eq!(map.len(), total as usize);

    let mut sum = 0u128;
    let mut visited = 0usize;
    map.visit_all(|_, v| {
        sum += *v as u128;
        visited += 1;
    });
    assert_eq!(visited, total as usize);
    let expected: u128 = (0..total).map(|k| (k as u128) * (k as u128)).sum();
    assert_eq!(sum, expected);
}

#[test]
fn concurrent_colliding_writers_elect_one_winner() {
    let map = Arc::new(ConcurrentMap::<u64, u64>::new());
    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let map = Arc::clone(&map);
            std::thread::spawn(move || {
                for rep in 0..1_000u64 {
                    for key in 0..10u64 {
                        // value encodes writer and attempt so any winner
                        // can be validated
                        map.insert(key, key * 1_000_000 + t * 10_000 + rep);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(map.len(), 10);
    for key in 0..10u64 {
        let mut value = None;
        assert_eq!(map.visit(&key, |v| value = Some(*v)), 1);
        let value = value.unwrap();
        // exactly one of the attempted values won
        assert_eq!(value / 1_000_000, key);
        let t = (value % 1_000_000) / 10_000;
        let rep = value % 10_000;
        assert!(t < 8 && rep < 1_000);
    }
}

#[test]
fn multi_map_serialization_preserves_equal_ranges() {
    let mut map: MultiMap<String, u32> = MultiMap::new();
    map.insert("a".to_string(), 1);
    map.insert("a".to_string(), 2);
    map.insert("b".to_string(), 3);

    let mut buf = bytes::BytesMut::new();
    map.serialize_into(&mut buf);
    let back: MultiMap<String, u32> = MultiMap::deserialize_from(&mut buf.freeze()).unwrap();

    let mut a_values: Vec<u32> = back.get_all("a").copied().collect();
    a_values.sort_unstable();
    assert_eq!(a_values, vec![1, 2]);
    assert_eq!(back.get_all("b").copied().collect::<Vec<_>>(), vec![3]);
    assert_eq!(back.len(), 3);
}

#[test]
fn node_map_pointers_survive_reserve_driven_rehashes() {
    let mut map: NodeMap<u32, String> = NodeMap::new();
    for i in 0..1_000u32 {
        map.insert(i, format!("value-{i}"));
    }
    let pointers: Vec<*const String> =
        (0..1_000u32).map(|i| map.get(&i).unwrap() as *const String).collect();

    map.reserve(10_000);
    map.reserve(50_000);
    map.reserve(200_000);

    for (i, &p) in pointers.iter().enumerate() {
        let now = map.get(&(i as u32)).unwrap() as *const String;
        assert_eq!(p, now, "value {} moved during rehash", i);
        assert_eq!(unsafe { &*now }, &format!("value-{i}"));
    }
}
