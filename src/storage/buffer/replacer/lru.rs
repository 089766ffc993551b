use std::hash::Hash;

use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

/// LRU (Least Recently Used) replacement policy.
///
/// Holds only identifiers that are currently evictable; the buffer pool
/// inserts a frame when its pin count drops to zero and erases it when the
/// frame is pinned again. All operations are serialized on one mutex.
pub struct LruReplacer<T: Hash + Eq + Copy> {
    entries: Mutex<LinkedHashMap<T, ()>>,
}

impl<T: Hash + Eq + Copy> LruReplacer<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LinkedHashMap::new()),
        }
    }

    /// Make `value` the most recently used element, repositioning it if
    /// already present.
    pub fn insert(&self, value: T) {
        let mut entries = self.entries.lock();
        entries.remove(&value);
        entries.insert(value, ());
    }

    /// Remove and return the least recently used element.
    pub fn victim(&self) -> Option<T> {
        self.entries.lock().pop_front().map(|(value, _)| value)
    }

    /// Remove `value` if present; returns whether it was there.
    pub fn erase(&self, value: &T) -> bool {
        self.entries.lock().remove(value).is_some()
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }
}

impl<T: Hash + Eq + Copy> Default for LruReplacer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_order() {
        let replacer = LruReplacer::new();
        replacer.insert(1);
        replacer.insert(2);
        replacer.insert(3);
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_reinsert_repositions() {
        let replacer = LruReplacer::new();
        replacer.insert(1);
        replacer.insert(2);
        replacer.insert(1); // 1 becomes most recently used
        assert_eq!(replacer.size(), 2);

        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_erase() {
        let replacer = LruReplacer::new();
        replacer.insert(1);
        replacer.insert(2);

        assert!(replacer.erase(&1));
        assert!(!replacer.erase(&1));
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
    }
}
