use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Explicit memoization wrapper.
///
/// Stored as a plain field by its owner; the owner builds the key and
/// provides the computation, and the wrapper guarantees the computation runs
/// at most once per distinct key for its lifetime.
#[derive(Debug)]
pub struct Memoized<K, V> {
    entries: FxHashMap<K, V>,
    hits: u64,
    misses: u64,
}

impl<K, V> Default for Memoized<K, V> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<K: Eq + Hash, V: Clone> Memoized<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    pub fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.entries.get(&key) {
            self.hits += 1;
            return value.clone();
        }

        self.misses += 1;
        let value = compute();
        self.entries.insert(key, value.clone());
        value
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_computes_once_per_key() {
        let mut memo: Memoized<String, usize> = Memoized::new();
        let mut calls = 0;

        let a = memo.get_or_compute("a".to_string(), || {
            calls += 1;
            1
        });
        let again = memo.get_or_compute("a".to_string(), || {
            calls += 1;
            2
        });

        assert_eq!(a, 1);
        assert_eq!(again, 1);
        assert_eq!(calls, 1);
        assert_eq!(memo.hits(), 1);
        assert_eq!(memo.misses(), 1);
    }

    #[test]
    fn test_distinct_keys() {
        let mut memo: Memoized<(u8, u8), u8> = Memoized::new();
        memo.get_or_compute((1, 2), || 3);
        memo.get_or_compute((2, 1), || 4);

        assert_eq!(memo.len(), 2);
        assert_eq!(memo.get(&(2, 1)), Some(&4));
    }
}
