//! Collision-pressure tests: a constant hasher funnels every element
//! through one probe sequence, exercising the overflow short-circuit
//! machinery harder than any realistic hash would.

use std::hash::{BuildHasherDefault, Hasher};

use grouptable::{Map, Set};

/// Worst-case hasher: every key collides on hash, group and fragment.
#[derive(Default)]
struct ConstantHasher;

impl Hasher for ConstantHasher {
    fn finish(&self) -> u64 {
        0x5151_5151_5151_5151
    }

    fn write(&mut self, _bytes: &[u8]) {}
}

type ConstantBuild = BuildHasherDefault<ConstantHasher>;

#[test]
fn displaced_elements_remain_findable() {
    let mut set: Set<u32, ConstantBuild> = Set::with_hasher(ConstantBuild::default());
    // far more than one group's worth, so most elements displace past
    // their starting group and set overflow bits along the way
    for v in 0..100u32 {
        assert!(set.insert(v));
    }
    assert_eq!(set.len(), 100);
    for v in 0..100u32 {
        assert!(set.contains(&v), "displaced element {} got lost", v);
    }
    // unsuccessful lookups must terminate (and fail) despite every
    // fragment matching
    for v in 100..200u32 {
        assert!(!set.contains(&v));
    }
}

#[test]
fn erasure_keeps_probe_chains_intact() {
    let mut set: Set<u32, ConstantBuild> = Set::with_hasher(ConstantBuild::default());
    for v in 0..120u32 {
        set.insert(v);
    }
    // erase a band in the middle of the probe chain
    for v in 30..60u32 {
        assert!(set.remove(&v));
    }
    // elements displaced past the erased band must still be reachable:
    // overflow bits are sticky and keep the probe going
    for v in 60..120u32 {
        assert!(set.contains(&v), "element {} unreachable after erasure", v);
    }
    for v in 30..60u32 {
        assert!(!set.contains(&v));
    }
    // freed slots are reused by new insertions
    let len = set.len();
    assert!(set.insert(1_000));
    assert_eq!(set.len(), len + 1);
    assert!(set.contains(&1_000));
}

#[test]
fn same_capacity_rehash_sheds_stale_overflow() {
    let mut map: Map<u32, u32, ConstantBuild> = Map::with_hasher(ConstantBuild::default());
    for v in 0..90u32 {
        map.insert(v, v);
    }
    for v in 0..60u32 {
        map.remove(&v);
    }
    let capacity = map.capacity();
    // rebuild in place: same capacity, overflow bytes recomputed from the
    // survivors only
    map.rehash(capacity);
    assert_eq!(map.capacity(), capacity);
    assert_eq!(map.len(), 30);
    for v in 60..90u32 {
        assert_eq!(map[&v], v);
    }
    for v in 0..60u32 {
        assert_eq!(map.get(&v), None);
    }
}

#[test]
fn mixed_collision_groups_stay_consistent() {
    // two-value hash: half the keys share one probe sequence, half the
    // other, with interleaved insertions and erasures
    #[derive(Default)]
    struct TwoBucket(u64);
    impl Hasher for TwoBucket {
        fn finish(&self) -> u64 {
            if self.0 % 2 == 0 {
                0xaaaa_aaaa_aaaa_aaaa
            } else {
                0x5555_5555_5555_5555
            }
        }
        fn write(&mut self, _bytes: &[u8]) {}
        fn write_u32(&mut self, i: u32) {
            self.0 = i as u64;
        }
    }

    let mut set: Set<u32, BuildHasherDefault<TwoBucket>> = Set::default();
    for v in 0..200u32 {
        set.insert(v);
    }
    for v in (0..200u32).step_by(4) {
        set.remove(&v);
    }
    assert_eq!(set.len(), 150);
    for v in 0..200u32 {
        assert_eq!(set.contains(&v), v % 4 != 0);
    }
}
