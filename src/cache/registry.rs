//! Dependency registry for cache invalidation.
//!
//! Every stored list declares which subject kinds it was computed from.
//! Invalidation walks the kind tag to the registered keys instead of
//! pattern-matching key names, so a mutation to any subject of a kind drops
//! exactly the entries that could have observed it.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::domain::catalog::SubjectKind;

use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

/// Tracks kind → cache_keys and cache_key → kinds mappings.
///
/// The mapping is bidirectional so that an entry leaving the store (expiry,
/// eviction, invalidation) can clean up every tag that points at it.
pub struct CacheRegistry {
    kind_to_keys: RwLock<HashMap<SubjectKind, HashSet<CacheKey>>>,
    key_to_kinds: RwLock<HashMap<CacheKey, HashSet<SubjectKind>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            kind_to_keys: RwLock::new(HashMap::new()),
            key_to_kinds: RwLock::new(HashMap::new()),
        }
    }

    /// Register a cache entry under the kinds it depends on.
    ///
    /// Re-registering a key replaces its previous tags.
    pub fn register(&self, cache_key: CacheKey, kinds: HashSet<SubjectKind>) {
        let mut k2k = rw_write(&self.kind_to_keys, SOURCE, "register.kind_to_keys");
        let mut key2 = rw_write(&self.key_to_kinds, SOURCE, "register.key_to_kinds");

        if let Some(previous) = key2.remove(&cache_key) {
            for kind in previous {
                if let Some(keys) = k2k.get_mut(&kind) {
                    keys.remove(&cache_key);
                    if keys.is_empty() {
                        k2k.remove(&kind);
                    }
                }
            }
        }

        for kind in &kinds {
            k2k.entry(*kind).or_default().insert(cache_key.clone());
        }
        key2.insert(cache_key, kinds);
    }

    /// All cache keys that must drop when a subject of `kind` changes.
    pub fn keys_for_kind(&self, kind: SubjectKind) -> HashSet<CacheKey> {
        rw_read(&self.kind_to_keys, SOURCE, "keys_for_kind")
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// The kinds a cache key was registered under.
    pub fn kinds_for_key(&self, cache_key: &CacheKey) -> HashSet<SubjectKind> {
        rw_read(&self.key_to_kinds, SOURCE, "kinds_for_key")
            .get(cache_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a cache key and every tag pointing at it.
    ///
    /// Called when an entry is evicted, expires or is invalidated.
    pub fn unregister(&self, cache_key: &CacheKey) {
        let mut k2k = rw_write(&self.kind_to_keys, SOURCE, "unregister.kind_to_keys");
        let mut key2 = rw_write(&self.key_to_kinds, SOURCE, "unregister.key_to_kinds");

        if let Some(kinds) = key2.remove(cache_key) {
            for kind in kinds {
                if let Some(keys) = k2k.get_mut(&kind) {
                    keys.remove(cache_key);
                    if keys.is_empty() {
                        k2k.remove(&kind);
                    }
                }
            }
        }
    }

    /// Clear all mappings.
    pub fn clear(&self) {
        rw_write(&self.kind_to_keys, SOURCE, "clear.kind_to_keys").clear();
        rw_write(&self.key_to_kinds, SOURCE, "clear.key_to_kinds").clear();
    }

    /// Number of kinds with at least one registered key.
    pub fn kind_count(&self) -> usize {
        rw_read(&self.kind_to_keys, SOURCE, "kind_count").len()
    }

    /// Number of registered cache keys.
    pub fn key_count(&self) -> usize {
        rw_read(&self.key_to_kinds, SOURCE, "key_count").len()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
