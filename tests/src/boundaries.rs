use grouptable::{Map, MultiMap, MultiSet, NodeSet, Set};

#[test]
fn empty_containers() {
    let map: Map<u64, u64> = Map::new();
    assert_eq!(map.len(), 0);
    assert!(map.is_empty());
    assert_eq!(map.capacity(), 0);
    assert_eq!(map.get(&1), None);
    assert_eq!(map.iter().count(), 0);
    assert_eq!(map.load_factor(), 0.0);

    let mut map = map;
    assert_eq!(map.remove(&1), None);

    let multi: MultiMap<u64, u64> = MultiMap::new();
    assert_eq!(multi.len(), 0);
    assert_eq!(multi.bucket_count(), 0);
    assert_eq!(multi.get_all(&1).count(), 0);
    assert_eq!(multi.iter().count(), 0);

    let mut multi = multi;
    assert_eq!(multi.remove_all(&1), 0);
}

#[test]
fn load_factor_boundary_is_exact() {
    let mut map: Map<u64, u64> = Map::with_capacity(64);
    let ml = map.max_load();
    let capacity = map.capacity();
    for i in 0..ml as u64 {
        map.insert(i, i);
    }
    // filling to exactly the max load must not rehash
    assert_eq!(map.capacity(), capacity);
    assert_eq!(map.len(), ml);
    // one more does
    map.insert(u64::MAX, 0);
    assert!(map.capacity() > capacity);
    for i in 0..ml as u64 {
        assert_eq!(map[&i], i);
    }
    assert_eq!(map[&u64::MAX], 0);
}

#[test]
fn rehash_is_idempotent_on_bucket_count() {
    let mut map: Map<u64, u64> = (0..500).map(|i| (i, i)).collect();
    map.rehash(2_000);
    let capacity = map.capacity();
    map.rehash(2_000);
    assert_eq!(map.capacity(), capacity);

    let mut multi: MultiSet<u64> = (0..500).collect();
    multi.rehash(2_000);
    let buckets = multi.bucket_count();
    multi.rehash(2_000);
    assert_eq!(multi.bucket_count(), buckets);
}

#[test]
fn insert_erase_round_trip_restores_size() {
    let mut set: Set<u64> = (0..100).collect();
    let size = set.len();
    assert!(set.insert(1_000));
    assert!(set.remove(&1_000));
    assert_eq!(set.len(), size);
    assert!(!set.contains(&1_000));
}

#[test]
fn custom_max_load_factor_rehashes_earlier() {
    let mut map: Map<u64, u64> = Map::new();
    map.set_max_load_factor(0.5);
    for i in 0..1_000u64 {
        map.insert(i, i);
    }
    assert!(map.load_factor() <= 0.5 + f32::EPSILON);
    assert_eq!(map.len(), 1_000);
}

#[test]
fn clear_then_reuse() {
    let mut set: NodeSet<String> = (0..100).map(|i| format!("s{i}")).collect();
    set.clear();
    assert!(set.is_empty());
    assert!(set.insert("fresh".into()));
    assert!(set.contains("fresh"));
}

#[test]
fn multi_map_growth_walks_prime_buckets() {
    let mut map: MultiMap<u64, u64> = MultiMap::new();
    map.insert(0, 0);
    let mut seen = vec![map.bucket_count()];
    for i in 1..10_000u64 {
        map.insert(i, i);
        let buckets = map.bucket_count();
        if buckets != *seen.last().unwrap() {
            seen.push(buckets);
        }
    }
    // the bucket sequence starts at the smallest prime and only climbs
    assert_eq!(seen[0], 13);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    for &b in &seen {
        // primes from the fixed policy sequence
        assert!([13usize, 29, 53, 97, 193, 389, 769, 1543, 3079, 6151, 12289, 24593]
            .contains(&b));
    }
}

#[test]
fn iteration_count_matches_len_after_churn() {
    let mut map: Map<u32, u32> = Map::new();
    for i in 0..2_000 {
        map.insert(i, i);
    }
    for i in (0..2_000).step_by(3) {
        map.remove(&i);
    }
    for i in 4_000..4_500 {
        map.insert(i, i);
    }
    assert_eq!(map.iter().count(), map.len());

    let mut multi: MultiSet<u32> = MultiSet::new();
    for i in 0..2_000 {
        multi.insert(i % 100);
    }
    multi.remove_all(&7);
    assert_eq!(multi.iter().count(), multi.len());
}

#[test]
fn find_after_insert_for_every_element() {
    let mut map: Map<i64, i64> = Map::new();
    for i in -500..500 {
        map.insert(i, i * 7);
    }
    for i in -500..500 {
        assert_eq!(map.get(&i), Some(&(i * 7)));
    }

    let mut multi: MultiMap<i64, i64> = MultiMap::new();
    for i in -500..500 {
        multi.insert(i % 50, i);
    }
    for i in -50..50 {
        assert!(multi.contains_key(&(i % 50)));
    }
}
