use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;

/// Extendible hash table, used as the buffer pool's page directory
/// (page id → frame id).
///
/// The directory holds `2^global_depth` slots; each slot references a
/// bucket whose `local_depth` low hash bits are shared by every slot
/// pointing at it. A full bucket splits on bit `local_depth`, doubling
/// the directory first when its depth already matches the global depth.
/// Removal never merges buckets. Operations are serialized on one mutex.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    core: Mutex<Directory<K, V>>,
}

struct Directory<K, V> {
    global_depth: usize,
    slots: Vec<Arc<Mutex<Bucket<K, V>>>>,
}

struct Bucket<K, V> {
    local_depth: usize,
    items: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: usize) -> Self {
        Self {
            local_depth,
            items: Vec::new(),
        }
    }
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0);
        Self {
            bucket_size,
            core: Mutex::new(Directory {
                global_depth: 0,
                slots: vec![Arc::new(Mutex::new(Bucket::new(0)))],
            }),
        }
    }

    fn hash_key(key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }

    fn bucket_index(hash: usize, global_depth: usize) -> usize {
        hash & ((1usize << global_depth) - 1)
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let core = self.core.lock();
        let index = Self::bucket_index(Self::hash_key(key), core.global_depth);
        let bucket = core.slots[index].lock();
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn remove(&self, key: &K) -> bool {
        let core = self.core.lock();
        let index = Self::bucket_index(Self::hash_key(key), core.global_depth);
        let mut bucket = core.slots[index].lock();
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Insert or overwrite the value for `key`, splitting the target
    /// bucket while it cannot take the new entry.
    pub fn insert(&self, key: K, value: V) {
        let mut core = self.core.lock();
        let hash = Self::hash_key(&key);

        let mut index = Self::bucket_index(hash, core.global_depth);
        {
            let mut bucket = core.slots[index].lock();
            if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }
        }

        // split while the target bucket is full; a pathological hash
        // distribution may need several rounds
        loop {
            let bucket_arc = core.slots[index].clone();
            let mut bucket = bucket_arc.lock();
            if bucket.items.len() < self.bucket_size {
                bucket.items.push((key, value));
                return;
            }

            if bucket.local_depth == core.global_depth {
                // double the directory, duplicating every slot
                core.global_depth += 1;
                let doubled: Vec<_> = core.slots.iter().cloned().collect();
                core.slots.extend(doubled);
            }

            let local_depth = bucket.local_depth + 1;
            let mask = 1usize << (local_depth - 1);
            let zero = Arc::new(Mutex::new(Bucket::new(local_depth)));
            let one = Arc::new(Mutex::new(Bucket::new(local_depth)));
            for (k, v) in bucket.items.drain(..) {
                let target = if Self::hash_key(&k) & mask != 0 { &one } else { &zero };
                target.lock().items.push((k, v));
            }
            drop(bucket);

            // re-target every directory slot whose old suffix matched
            let start = hash & (mask - 1);
            let mut i = start;
            while i < core.slots.len() {
                core.slots[i] = if i & mask != 0 { one.clone() } else { zero.clone() };
                i += mask;
            }

            index = Self::bucket_index(hash, core.global_depth);
        }
    }

    pub fn global_depth(&self) -> usize {
        self.core.lock().global_depth
    }

    pub fn local_depth(&self, bucket_index: usize) -> usize {
        let core = self.core.lock();
        let local_depth = core.slots[bucket_index].lock().local_depth;
        local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.core.lock().slots.len()
    }
}
