use std::{collections::HashMap, marker::PhantomData};

/// Keys for [`BigMap`]: opaque handles backed by a u64 that is never reused
/// for the lifetime of the map.
pub trait BigMapKey: Clone + Copy + Eq + std::hash::Hash {
    fn to_u64(&self) -> u64;
    fn from_u64(value: u64) -> Self;
}

/// A map that allocates its own keys on insertion. Used to hand out stable
/// handles (connection keys) without exposing the underlying storage.
pub struct BigMap<K: BigMapKey, V> {
    map: HashMap<u64, V>,
    next_key: u64,
    phantom: PhantomData<K>,
}

impl<K: BigMapKey, V> BigMap<K, V> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            next_key: 0,
            phantom: PhantomData,
        }
    }

    /// Inserts a value, returning the freshly allocated key for it.
    pub fn insert(&mut self, value: V) -> K {
        let key = self.next_key;
        self.next_key = self.next_key.wrapping_add(1);
        self.map.insert(key, value);
        K::from_u64(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(&key.to_u64())
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.map.get_mut(&key.to_u64())
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(&key.to_u64())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(&key.to_u64())
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.map.iter().map(|(key, value)| (K::from_u64(*key), value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> {
        self.map
            .iter_mut()
            .map(|(key, value)| (K::from_u64(*key), value))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: BigMapKey, V> Default for BigMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
