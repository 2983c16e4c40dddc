use std::sync::Arc;

use rayon::prelude::*;

use grouptable::{ConcurrentMap, ConcurrentSet};

#[test]
fn rayon_insert_then_verify() {
    let map: ConcurrentMap<u64, u64> = ConcurrentMap::with_capacity(1024);
    (0..50_000u64).into_par_iter().for_each(|i| {
        assert!(map.insert(i, i.wrapping_mul(31)));
    });
    assert_eq!(map.len(), 50_000);
    (0..50_000u64).into_par_iter().for_each(|i| {
        let mut v = 0;
        assert_eq!(map.visit(&i, |x| v = *x), 1);
        assert_eq!(v, i.wrapping_mul(31));
    });
}

#[test]
fn growth_under_contention_loses_nothing() {
    // deliberately tiny so every thread keeps tripping rehashes
    let map = Arc::new(ConcurrentMap::<u64, u64>::with_capacity(1));
    let threads = usize::max(4, num_cpus::get());
    let per_thread = 5_000u64;
    let handles: Vec<_> = (0..threads as u64)
        .map(|t| {
            let map = Arc::clone(&map);
            std::thread::spawn(move || {
                let base = t * per_thread;
                for k in base..base + per_thread {
                    assert!(map.insert(k, k + 1));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(map.len(), threads * per_thread as usize);
    let mut count = 0usize;
    map.visit_all(|k, v| {
        assert_eq!(*v, k + 1);
        count += 1;
    });
    assert_eq!(count, threads * per_thread as usize);
}

#[test]
fn concurrent_insert_and_remove_disjoint_ranges() {
    let map = Arc::new(ConcurrentMap::<u64, u64>::new());
    for k in 0..10_000u64 {
        map.insert(k, k);
    }
    let inserter = {
        let map = Arc::clone(&map);
        std::thread::spawn(move || {
            for k in 10_000..20_000u64 {
                assert!(map.insert(k, k));
            }
        })
    };
    let remover = {
        let map = Arc::clone(&map);
        std::thread::spawn(move || {
            for k in 0..10_000u64 {
                assert!(map.remove(&k), "pre-inserted key {} missing", k);
            }
        })
    };
    inserter.join().unwrap();
    remover.join().unwrap();
    assert_eq!(map.len(), 10_000);
    for k in 10_000..20_000u64 {
        assert!(map.contains_key(&k));
    }
}

#[test]
fn visit_mut_updates_are_linearized_per_key() {
    let map = Arc::new(ConcurrentMap::<u32, u64>::new());
    for k in 0..16u32 {
        map.insert(k, 0);
    }
    let threads = 8;
    let bumps_per_thread = 2_000;
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let map = Arc::clone(&map);
            std::thread::spawn(move || {
                for i in 0..bumps_per_thread {
                    let key = (i % 16) as u32;
                    assert_eq!(map.visit_mut(&key, |v| *v += 1), 1);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let mut total = 0u64;
    map.visit_all(|_, v| total += *v);
    assert_eq!(total, (threads * bumps_per_thread) as u64);
}

#[test]
fn insert_or_visit_accumulates() {
    let map = Arc::new(ConcurrentMap::<u32, u64>::new());
    (0..10_000u32).into_par_iter().for_each(|i| {
        map.insert_or_visit(i % 100, 1, |v| *v += 1);
    });
    let mut total = 0u64;
    let mut count = 0;
    map.visit_all(|_, v| {
        total += *v;
        count += 1;
    });
    assert_eq!(count, 100);
    // every one of the 10_000 attempts either inserted 1 or added 1
    assert_eq!(total, 10_000);
}

#[test]
fn erase_if_respects_predicate() {
    let map: ConcurrentMap<u32, u32> = ConcurrentMap::new();
    map.insert(1, 10);
    map.insert(2, 20);
    assert_eq!(map.erase_if(&1, |v| *v > 100), 0);
    assert_eq!(map.len(), 2);
    assert_eq!(map.erase_if(&1, |v| *v == 10), 1);
    assert_eq!(map.len(), 1);
}

#[test]
fn retain_and_clear() {
    let map: ConcurrentMap<u32, u32> = ConcurrentMap::new();
    for i in 0..1_000 {
        map.insert(i, i);
    }
    let erased = map.retain(|k, _| k % 2 == 0);
    assert_eq!(erased, 500);
    assert_eq!(map.len(), 500);
    map.clear();
    assert!(map.is_empty());
    assert!(map.insert(7, 7));
}

#[test]
fn concurrent_set_parallel_dedup() {
    let set: ConcurrentSet<u64> = ConcurrentSet::new();
    (0..40_000u64).into_par_iter().for_each(|i| {
        set.insert(i % 1_000);
    });
    assert_eq!(set.len(), 1_000);
    let mut seen = 0;
    set.visit_all(|_| seen += 1);
    assert_eq!(seen, 1_000);
}

#[test]
fn swap_exchanges_contents() {
    let a: ConcurrentMap<u32, u32> = ConcurrentMap::new();
    let b: ConcurrentMap<u32, u32> = ConcurrentMap::new();
    a.insert(1, 1);
    b.insert(2, 2);
    b.insert(3, 3);
    a.swap(&b);
    assert_eq!(a.len(), 2);
    assert_eq!(b.len(), 1);
    assert!(a.contains_key(&2));
    assert!(b.contains_key(&1));
}

#[test]
fn cross_merge_from_both_sides_does_not_deadlock() {
    let a = Arc::new(ConcurrentMap::<u32, u32>::new());
    let b = Arc::new(ConcurrentMap::<u32, u32>::new());
    for i in 0..500 {
        a.insert(i, i);
        b.insert(i + 500, i);
    }
    let t1 = {
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        std::thread::spawn(move || a.merge(&b))
    };
    let t2 = {
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        std::thread::spawn(move || b.merge(&a))
    };
    t1.join().unwrap();
    t2.join().unwrap();
    // 1000 distinct keys exist in total, wherever they ended up
    assert_eq!(a.len() + b.len(), 1_000);
}
