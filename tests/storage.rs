use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use blinkdb::store::StorageEngine;
use blinkdb::sweeper::spawn_sweeper;

#[test]
fn set_get_del_cycle() {
    let mut engine = StorageEngine::new(1024);

    engine.set(b"foo".to_vec(), b"bar".to_vec(), None);
    assert_eq!(engine.get(b"foo"), Some(b"bar".to_vec()));
    assert_eq!(engine.len(), 1);
    assert_eq!(engine.used_memory(), 6);

    assert!(engine.del(b"foo"));
    assert_eq!(engine.get(b"foo"), None);
    assert!(!engine.del(b"foo"));
    assert_eq!(engine.used_memory(), 0);
    assert!(engine.is_empty());
}

#[test]
fn replace_reaccounts_bytes() {
    let mut engine = StorageEngine::new(1024);

    engine.set(b"k".to_vec(), b"12345678".to_vec(), None);
    assert_eq!(engine.used_memory(), 9);

    engine.set(b"k".to_vec(), b"12".to_vec(), None);
    assert_eq!(engine.used_memory(), 3);
    assert_eq!(engine.len(), 1);
    assert_eq!(engine.get(b"k"), Some(b"12".to_vec()));
}

#[test]
fn accounting_tracks_every_mutation() {
    let mut engine = StorageEngine::new(1 << 20);
    let mut expected = 0usize;

    for i in 0..100u32 {
        let key = format!("key-{}", i).into_bytes();
        let value = vec![b'x'; (i as usize % 17) + 1];
        expected += key.len() + value.len();
        engine.set(key, value, None);
        assert_eq!(engine.used_memory(), expected);
    }

    for i in (0..100u32).step_by(2) {
        let key = format!("key-{}", i).into_bytes();
        let removed = (i as usize % 17) + 1 + key.len();
        assert!(engine.del(&key));
        expected -= removed;
        assert_eq!(engine.used_memory(), expected);
    }
}

#[test]
fn evicts_least_recently_used_when_over_budget() {
    // Three 8-byte entries against a 16-byte budget
    let mut engine = StorageEngine::new(16);
    engine.set(b"a".to_vec(), b"1234567".to_vec(), None);
    engine.set(b"b".to_vec(), b"1234567".to_vec(), None);
    engine.set(b"c".to_vec(), b"1234567".to_vec(), None);

    assert_eq!(engine.get(b"a"), None);
    assert_eq!(engine.get(b"b"), Some(b"1234567".to_vec()));
    assert_eq!(engine.get(b"c"), Some(b"1234567".to_vec()));
    assert!(engine.used_memory() <= 16);
    assert_eq!(engine.len(), 2);
}

#[test]
fn a_read_protects_a_key_from_eviction() {
    let mut engine = StorageEngine::new(16);
    engine.set(b"a".to_vec(), b"1234567".to_vec(), None);
    engine.set(b"b".to_vec(), b"1234567".to_vec(), None);

    // Reading a makes b the eviction candidate
    assert!(engine.get(b"a").is_some());
    engine.set(b"c".to_vec(), b"1234567".to_vec(), None);

    assert_eq!(engine.get(b"b"), None);
    assert!(engine.get(b"a").is_some());
    assert!(engine.get(b"c").is_some());
}

#[test]
fn oversized_entry_is_accepted_then_evicted() {
    let mut engine = StorageEngine::new(4);
    engine.set(b"big".to_vec(), b"0123456789".to_vec(), None);

    assert_eq!(engine.get(b"big"), None);
    assert_eq!(engine.used_memory(), 0);
    assert!(engine.is_empty());
}

#[test]
fn expired_entry_is_missing_on_get() {
    let mut engine = StorageEngine::new(1024);
    engine.set(b"k".to_vec(), b"v".to_vec(), Some(Duration::from_millis(30)));

    assert_eq!(engine.get(b"k"), Some(b"v".to_vec()));
    thread::sleep(Duration::from_millis(60));

    assert_eq!(engine.get(b"k"), None);
    assert_eq!(engine.used_memory(), 0);
    assert!(engine.is_empty());
}

#[test]
fn ttl_is_fixed_at_write_time() {
    let mut engine = StorageEngine::new(1024);
    engine.set(b"k".to_vec(), b"v".to_vec(), Some(Duration::from_millis(80)));

    // Reads must not extend the deadline
    thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.get(b"k"), Some(b"v".to_vec()));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.get(b"k"), None);
}

#[test]
fn entries_without_ttl_never_expire() {
    let mut engine = StorageEngine::new(1024);
    engine.set(b"k".to_vec(), b"v".to_vec(), None);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.evict_expired(), 0);
    assert_eq!(engine.get(b"k"), Some(b"v".to_vec()));
}

#[test]
fn sweep_removes_only_expired_entries() {
    let mut engine = StorageEngine::new(1024);
    engine.set(b"gone1".to_vec(), b"x".to_vec(), Some(Duration::from_millis(20)));
    engine.set(b"gone2".to_vec(), b"y".to_vec(), Some(Duration::from_millis(20)));
    engine.set(b"kept".to_vec(), b"z".to_vec(), None);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.evict_expired(), 2);

    assert_eq!(engine.len(), 1);
    assert_eq!(engine.used_memory(), b"kept".len() + 1);
    assert_eq!(engine.get(b"kept"), Some(b"z".to_vec()));
    assert_eq!(engine.get(b"gone1"), None);
}

#[test]
fn overwriting_clears_a_previous_ttl() {
    let mut engine = StorageEngine::new(1024);
    engine.set(b"k".to_vec(), b"v1".to_vec(), Some(Duration::from_millis(20)));
    engine.set(b"k".to_vec(), b"v2".to_vec(), None);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.evict_expired(), 0);
    assert_eq!(engine.get(b"k"), Some(b"v2".to_vec()));
}

#[test]
fn sweeper_thread_expires_keys_without_reads() {
    let engine = Arc::new(Mutex::new(StorageEngine::new(1024)));
    let mut sweeper = spawn_sweeper(engine.clone(), Duration::from_millis(20)).unwrap();

    engine.lock().unwrap().set(
        b"short".to_vec(),
        b"lived".to_vec(),
        Some(Duration::from_millis(40)),
    );
    engine
        .lock()
        .unwrap()
        .set(b"stays".to_vec(), b"here".to_vec(), None);

    thread::sleep(Duration::from_millis(150));

    {
        let engine = engine.lock().unwrap();
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.used_memory(), b"stays".len() + b"here".len());
    }

    sweeper.stop();
}
