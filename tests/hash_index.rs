use blinkdb::hash::{HashIndex, MIN_CAPACITY};

fn key(i: usize) -> Vec<u8> {
    format!("key-{}", i).into_bytes()
}

#[test]
fn insert_get_remove() {
    let mut index: HashIndex<Vec<u8>, u32> = HashIndex::new();
    assert!(index.is_empty());
    assert_eq!(index.capacity(), MIN_CAPACITY);

    assert_eq!(index.insert(b"a".to_vec(), 1), None);
    assert_eq!(index.insert(b"b".to_vec(), 2), None);
    assert_eq!(index.get(b"a".as_slice()), Some(&1));
    assert_eq!(index.get(b"b".as_slice()), Some(&2));
    assert_eq!(index.get(b"c".as_slice()), None);

    assert_eq!(index.remove(b"a".as_slice()), Some(1));
    assert_eq!(index.remove(b"a".as_slice()), None);
    assert_eq!(index.len(), 1);
}

#[test]
fn insert_overwrites_and_returns_old() {
    let mut index: HashIndex<Vec<u8>, u32> = HashIndex::new();
    assert_eq!(index.insert(b"k".to_vec(), 1), None);
    assert_eq!(index.insert(b"k".to_vec(), 2), Some(1));
    assert_eq!(index.len(), 1);
    assert_eq!(index.get(b"k".as_slice()), Some(&2));
}

#[test]
fn get_mut_updates_in_place() {
    let mut index: HashIndex<Vec<u8>, u32> = HashIndex::new();
    index.insert(b"k".to_vec(), 1);
    *index.get_mut(b"k".as_slice()).unwrap() = 9;
    assert_eq!(index.get(b"k".as_slice()), Some(&9));
}

#[test]
fn grows_past_the_load_factor_ceiling() {
    let mut index: HashIndex<Vec<u8>, usize> = HashIndex::new();
    for i in 0..5 {
        index.insert(key(i), i);
    }
    // 5 of 8 buckets used is still within 0.7
    assert_eq!(index.capacity(), MIN_CAPACITY);

    index.insert(key(5), 5);
    assert_eq!(index.capacity(), MIN_CAPACITY * 2);

    // Everything survives the rehash
    for i in 0..6 {
        assert_eq!(index.get(key(i).as_slice()), Some(&i));
    }
}

#[test]
fn shrinks_below_the_floor_but_never_under_minimum() {
    let mut index: HashIndex<Vec<u8>, usize> = HashIndex::new();
    for i in 0..6 {
        index.insert(key(i), i);
    }
    assert_eq!(index.capacity(), 16);

    index.remove(key(0).as_slice());
    index.remove(key(1).as_slice());
    assert_eq!(index.capacity(), 16); // 4 of 16 is exactly 0.25, no shrink

    index.remove(key(2).as_slice());
    assert_eq!(index.capacity(), MIN_CAPACITY); // 3 of 16 is under 0.2

    for i in 3..6 {
        assert_eq!(index.get(key(i).as_slice()), Some(&i));
    }

    index.remove(key(3).as_slice());
    index.remove(key(4).as_slice());
    index.remove(key(5).as_slice());
    assert_eq!(index.capacity(), MIN_CAPACITY);
    assert!(index.is_empty());
}

#[test]
fn load_factor_invariant_holds_through_churn() {
    let mut index: HashIndex<Vec<u8>, usize> = HashIndex::new();

    let check = |index: &HashIndex<Vec<u8>, usize>| {
        let (len, cap) = (index.len() as f64, index.capacity() as f64);
        assert!(len <= 0.7 * cap, "len {} over ceiling at capacity {}", len, cap);
        if index.capacity() > MIN_CAPACITY {
            assert!(len >= 0.2 * cap, "len {} under floor at capacity {}", len, cap);
        }
    };

    for i in 0..300 {
        index.insert(key(i), i);
        check(&index);
    }
    for i in 0..300 {
        assert_eq!(index.remove(key(i).as_slice()), Some(i));
        check(&index);
    }
}

#[test]
fn iter_visits_every_entry_once() {
    let mut index: HashIndex<Vec<u8>, usize> = HashIndex::new();
    for i in 0..50 {
        index.insert(key(i), i);
    }

    let mut seen: Vec<usize> = index.iter().map(|(_, v)| *v).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..50).collect::<Vec<_>>());
}

#[test]
fn iteration_order_is_stable_for_a_given_state() {
    let mut index: HashIndex<Vec<u8>, usize> = HashIndex::new();
    for i in 0..50 {
        index.insert(key(i), i);
    }
    let first: Vec<Vec<u8>> = index.iter().map(|(k, _)| k.clone()).collect();
    let second: Vec<Vec<u8>> = index.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(first, second);
}

#[test]
fn clear_keeps_capacity() {
    let mut index: HashIndex<Vec<u8>, usize> = HashIndex::new();
    for i in 0..20 {
        index.insert(key(i), i);
    }
    let cap = index.capacity();

    index.clear();
    assert!(index.is_empty());
    assert_eq!(index.capacity(), cap);
    assert_eq!(index.get(key(0).as_slice()), None);
    assert_eq!(index.iter().count(), 0);

    index.insert(key(0), 0);
    assert_eq!(index.get(key(0).as_slice()), Some(&0));
}
