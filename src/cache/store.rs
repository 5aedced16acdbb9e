//! Cache Store Module
//!
//! Ordered key/value storage the memoization policy configures. Most recently
//! used entries sit at the front; a bounded store trims from the back.

use crate::cache::hooks::StoreSnapshot;
use crate::equality::{ArgEquality, KeyMatching};
use crate::key::Key;

// == Capacity ==
/// Size bound of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// At most this many entries
    Bounded(usize),
    /// No native bound
    Unbounded,
}

// == Cache Store ==
/// Ordered key/value storage with pluggable key comparison.
#[derive(Debug)]
pub struct CacheStore<R> {
    /// Keys, most recent first
    keys: Vec<Key>,
    /// Values aligned with `keys`
    values: Vec<R>,
    /// Native size bound
    capacity: Capacity,
    /// Per-argument equality
    arg_equality: ArgEquality,
    /// Whole-key matcher
    key_matching: KeyMatching,
}

impl<R> CacheStore<R> {
    // == Constructor ==
    /// Creates an empty store.
    ///
    /// # Arguments
    /// * `capacity` - Native size bound
    /// * `arg_equality` - Per-argument equality used when no whole-key matcher applies
    /// * `key_matching` - Whole-key matcher
    pub fn new(capacity: Capacity, arg_equality: ArgEquality, key_matching: KeyMatching) -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            capacity,
            arg_equality,
            key_matching,
        }
    }

    // == Find ==
    /// Returns the index of the entry matching `key`.
    pub fn find(&self, key: &[serde_json::Value]) -> Option<usize> {
        self.keys
            .iter()
            .position(|cache_key| self.key_matching.matches(cache_key, key, &self.arg_equality))
    }

    /// Returns the index of the entry stored under exactly `key`.
    ///
    /// Ignores the configured matchers, so entries whose keys never match
    /// under the policy equality can still be located for removal.
    pub fn position(&self, key: &[serde_json::Value]) -> Option<usize> {
        self.keys.iter().position(|stored| stored.as_slice() == key)
    }

    // == Promote ==
    /// Moves the entry at `index` to the front.
    ///
    /// Returns true if the order changed.
    pub fn promote(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.keys.len() {
            return false;
        }
        let key = self.keys.remove(index);
        let value = self.values.remove(index);
        self.keys.insert(0, key);
        self.values.insert(0, value);
        true
    }

    // == Insert ==
    /// Inserts a new entry at the front.
    ///
    /// If the store is bounded and now over capacity, entries are trimmed from
    /// the back and their keys returned so the caller can release any state
    /// attached to them.
    pub fn insert(&mut self, key: Key, value: R) -> Vec<Key> {
        self.keys.insert(0, key);
        self.values.insert(0, value);

        match self.capacity {
            Capacity::Bounded(max) if self.keys.len() > max => {
                self.values.truncate(max);
                self.keys.split_off(max)
            }
            _ => Vec::new(),
        }
    }

    // == Replace ==
    /// Overwrites the value at `index`, returning the previous value.
    pub fn replace(&mut self, index: usize, value: R) -> Option<R> {
        self.values
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, value))
    }

    // == Remove ==
    /// Removes the entry at `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<(Key, R)> {
        if index >= self.keys.len() {
            return None;
        }
        Some((self.keys.remove(index), self.values.remove(index)))
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
    }

    // == Accessors ==
    /// Returns the value at `index`.
    pub fn value(&self, index: usize) -> Option<&R> {
        self.values.get(index)
    }

    /// Returns the key at `index`.
    pub fn key(&self, index: usize) -> Option<&Key> {
        self.keys.get(index)
    }

    /// Current keys, most recent first.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Current values, aligned with [`CacheStore::keys`].
    pub fn values(&self) -> &[R] {
        &self.values
    }

    /// Native size bound.
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Read-only view for hook handlers.
    pub fn snapshot(&self) -> StoreSnapshot<'_, R> {
        StoreSnapshot {
            keys: &self.keys,
            values: &self.values,
        }
    }

    // == Length ==
    /// Returns the current number of entries in the store.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    // == Is Empty ==
    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
