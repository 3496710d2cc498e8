use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

const SHARD_COUNT: usize = 16;

/// A uuid-keyed map split across independently locked shards.
pub(crate) struct ShardedMap<V> {
    shards: Vec<RwLock<HashMap<Uuid, V>>>,
}

impl<V: Clone> ShardedMap<V> {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &Uuid) -> &RwLock<HashMap<Uuid, V>> {
        // v4 and v7 uuids both keep random bits at the low end
        let idx = (key.as_u128() % SHARD_COUNT as u128) as usize;
        &self.shards[idx]
    }

    pub fn get(&self, key: &Uuid) -> Option<V> {
        self.shard(key).read().get(key).cloned()
    }

    pub fn insert(&self, key: Uuid, value: V) {
        self.shard(&key).write().insert(key, value);
    }

    pub fn get_or_insert_with(&self, key: Uuid, make: impl FnOnce() -> V) -> V {
        if let Some(v) = self.get(&key) {
            return v;
        }
        self.shard(&key).write().entry(key).or_insert_with(make).clone()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_insert_keeps_first_value() {
        let map: ShardedMap<u32> = ShardedMap::new();
        let key = Uuid::new_v4();
        assert_eq!(map.get_or_insert_with(key, || 1), 1);
        assert_eq!(map.get_or_insert_with(key, || 2), 1);
        assert_eq!(map.len(), 1);
    }
}
