/*!
 * Recency Tracker
 *
 * Ordered key sequence with most-recently-used at the front and the
 * eviction candidate at the back. A doubly linked list in a slab arena
 * plus a key-to-handle map makes touch, evict and forget all O(1).
 */

use std::borrow::Borrow;
use std::hash::{BuildHasherDefault, Hash};

use hashbrown::HashMap;
use slab::Slab;

type AHash = BuildHasherDefault<ahash::AHasher>;

struct LruNode<K> {
    key: K,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Tracks key recency; owns key identities only, never values.
pub struct LruTracker<K> {
    nodes: Slab<LruNode<K>>,
    map: HashMap<K, usize, AHash>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Hash + Eq + Clone> LruTracker<K> {
    pub fn new() -> Self {
        Self {
            nodes: Slab::new(),
            map: HashMap::default(),
            head: None,
            tail: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Mark `key` as most recently used, inserting it if absent.
    pub fn touch(&mut self, key: K) {
        if let Some(&idx) = self.map.get(&key) {
            self.unlink(idx);
            self.push_front(idx);
            return;
        }
        let idx = self.nodes.insert(LruNode {
            key: key.clone(),
            prev: None,
            next: None,
        });
        self.map.insert(key, idx);
        self.push_front(idx);
    }

    /// Remove and return the least recently used key.
    pub fn evict_lru(&mut self) -> Option<K> {
        let idx = self.tail?;
        self.unlink(idx);
        let node = self.nodes.remove(idx);
        self.map.remove(&node.key);
        Some(node.key)
    }

    /// Drop `key` from the sequence wherever it sits.
    pub fn forget<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(idx) = self.map.remove(key) {
            self.unlink(idx);
            self.nodes.remove(idx);
        }
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = None;
        self.nodes[idx].next = self.head;
        if let Some(old) = self.head {
            self.nodes[old].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
    }
}

impl<K: Hash + Eq + Clone> Default for LruTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}
