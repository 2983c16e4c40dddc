use bytes::BytesMut;

use grouptable::{Error, Map, MultiMap, MultiSet, NodeMap, NodeSet, Set};

#[test]
fn map_round_trip_preserves_membership() {
    let mut map: Map<String, u64> = Map::new();
    for i in 0..1_000u64 {
        map.insert(format!("key-{i}"), i * 3);
    }
    let mut buf = BytesMut::new();
    map.serialize_into(&mut buf);
    let back: Map<String, u64> = Map::deserialize_from(&mut buf.freeze()).unwrap();
    assert_eq!(map, back);
}

#[test]
fn set_round_trip_through_a_differently_shaped_source() {
    // heavy churn leaves the source with scattered slots; the stream only
    // carries the survivors
    let mut set: Set<u64> = (0..2_000).collect();
    for i in (0..2_000).step_by(2) {
        set.remove(&i);
    }
    let mut buf = BytesMut::new();
    set.serialize_into(&mut buf);
    let back: Set<u64> = Set::deserialize_from(&mut buf.freeze()).unwrap();
    assert_eq!(set, back);
    assert_eq!(back.len(), 1_000);
}

#[test]
fn node_containers_round_trip() {
    let mut map: NodeMap<u32, String> = NodeMap::new();
    for i in 0..200 {
        map.insert(i, format!("payload {i}"));
    }
    let mut buf = BytesMut::new();
    map.serialize_into(&mut buf);
    let back: NodeMap<u32, String> = NodeMap::deserialize_from(&mut buf.freeze()).unwrap();
    assert_eq!(back.len(), 200);
    for i in 0..200 {
        assert_eq!(back.get(&i), Some(&format!("payload {i}")));
    }

    let set: NodeSet<u64> = (0..100).collect();
    let mut buf = BytesMut::new();
    set.serialize_into(&mut buf);
    let back: NodeSet<u64> = NodeSet::deserialize_from(&mut buf.freeze()).unwrap();
    assert_eq!(back.len(), 100);
}

#[test]
fn multi_containers_keep_duplicate_counts() {
    let mut multi: MultiSet<u32> = MultiSet::new();
    for i in 0..50 {
        for _ in 0..(i % 5) + 1 {
            multi.insert(i);
        }
    }
    let total = multi.len();
    let mut buf = BytesMut::new();
    multi.serialize_into(&mut buf);
    let back: MultiSet<u32> = MultiSet::deserialize_from(&mut buf.freeze()).unwrap();
    assert_eq!(back.len(), total);
    for i in 0..50 {
        assert_eq!(back.count(&i), ((i % 5) + 1) as usize, "count mismatch for {i}");
    }

    let mut mm: MultiMap<u32, u32> = MultiMap::new();
    mm.insert(1, 1);
    mm.insert(1, 2);
    mm.insert(1, 3);
    let mut buf = BytesMut::new();
    mm.serialize_into(&mut buf);
    let back: MultiMap<u32, u32> = MultiMap::deserialize_from(&mut buf.freeze()).unwrap();
    let mut values: Vec<u32> = back.get_all(&1).copied().collect();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2, 3]);
}

#[test]
fn empty_containers_round_trip() {
    let map: Map<u64, u64> = Map::new();
    let mut buf = BytesMut::new();
    map.serialize_into(&mut buf);
    let back: Map<u64, u64> = Map::deserialize_from(&mut buf.freeze()).unwrap();
    assert!(back.is_empty());
}

#[test]
fn malformed_streams_report_errors() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[1, 2]);
    assert!(matches!(
        Map::<u64, u64>::deserialize_from(&mut buf.freeze()),
        Err(Error::Truncated)
    ));

    let set: Set<u64> = (0..4).collect();
    let mut buf = BytesMut::new();
    set.serialize_into(&mut buf);
    let bytes = buf.freeze();
    let mut truncated = bytes.slice(0..bytes.len() - 1);
    assert!(matches!(Set::<u64>::deserialize_from(&mut truncated), Err(Error::Truncated)));
}
