//! Cache storage for ordered id lists.
//!
//! Entries hold identifiers only. Callers rehydrate records live from the
//! repository and re-sort them to the cached order, so a cached list can
//! never serve stale record fields. An absent or expired entry means "not
//! computed", never "empty result".

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;
use uuid::Uuid;

use crate::domain::catalog::SubjectKind;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};
use super::registry::CacheRegistry;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_LIST_HIT: &str = "plaudit_cache_list_hit_total";
pub(crate) const METRIC_LIST_MISS: &str = "plaudit_cache_list_miss_total";
pub(crate) const METRIC_LIST_EVICT: &str = "plaudit_cache_list_evict_total";

/// A cached ordered id list with its expiry window.
#[derive(Debug, Clone)]
pub struct CachedIdList {
    pub ids: Vec<Uuid>,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CachedIdList {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// Read-through store for ordered id lists.
///
/// One LRU holds every query family; each entry carries its own TTL and the
/// registry remembers which subject kinds it was computed from. The store
/// keeps the registry in step with itself: whatever leaves the LRU (expiry,
/// eviction, invalidation) is unregistered in the same breath.
pub struct ListStore {
    enabled: bool,
    lists: RwLock<LruCache<CacheKey, CachedIdList>>,
    registry: Arc<CacheRegistry>,
}

impl ListStore {
    pub fn new(config: &CacheConfig, registry: Arc<CacheRegistry>) -> Self {
        Self {
            enabled: config.enable_list_cache,
            lists: RwLock::new(LruCache::new(config.list_limit_non_zero())),
            registry,
        }
    }

    /// Look up a live entry. Expired entries are dropped on sight and count
    /// as misses.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<Uuid>> {
        if !self.enabled {
            return None;
        }

        let mut lists = rw_write(&self.lists, SOURCE, "get");
        let entry = lists
            .get(key)
            .map(|entry| (entry.is_expired(), entry.ids.clone()));

        match entry {
            Some((false, ids)) => {
                counter!(METRIC_LIST_HIT, "family" => key.family()).increment(1);
                Some(ids)
            }
            Some((true, _)) => {
                lists.pop(key);
                drop(lists);
                self.registry.unregister(key);
                counter!(METRIC_LIST_MISS, "family" => key.family()).increment(1);
                None
            }
            None => {
                counter!(METRIC_LIST_MISS, "family" => key.family()).increment(1);
                None
            }
        }
    }

    /// Store a computed list under `key`, tagged with the kinds it depends
    /// on. An entry the LRU pushes out is unregistered and counted.
    pub fn insert(&self, key: CacheKey, ids: Vec<Uuid>, ttl: Duration, depends_on: &[SubjectKind]) {
        if !self.enabled {
            return;
        }

        let entry = CachedIdList {
            ids,
            stored_at: Instant::now(),
            ttl,
        };
        let evicted = rw_write(&self.lists, SOURCE, "insert")
            .push(key.clone(), entry)
            .map(|(evicted_key, _)| evicted_key);

        // push also reports a same-key replacement; only a different key is
        // a true eviction.
        if let Some(evicted_key) = evicted
            && evicted_key != key
        {
            self.registry.unregister(&evicted_key);
            counter!(METRIC_LIST_EVICT, "family" => evicted_key.family()).increment(1);
        }

        self.registry
            .register(key, depends_on.iter().copied().collect());
    }

    /// Return the cached list for `key`, or run `compute`, store the result
    /// and return it.
    ///
    /// `compute` runs without the store lock held. Concurrent computes for
    /// one key may race; the last writer wins and earlier results are
    /// simply replaced.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: CacheKey,
        ttl: Duration,
        depends_on: &[SubjectKind],
        compute: F,
    ) -> Result<Vec<Uuid>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Uuid>, E>>,
    {
        if !self.enabled {
            return compute().await;
        }

        if let Some(ids) = self.get(&key) {
            return Ok(ids);
        }

        let ids = compute().await?;
        self.insert(key, ids.clone(), ttl, depends_on);
        Ok(ids)
    }

    /// Drop one entry and its registry tags.
    pub fn invalidate(&self, key: &CacheKey) {
        rw_write(&self.lists, SOURCE, "invalidate").pop(key);
        self.registry.unregister(key);
    }

    /// Drop every entry and every tag.
    pub fn clear(&self) {
        rw_write(&self.lists, SOURCE, "clear").clear();
        self.registry.clear();
    }

    /// Number of stored lists, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        rw_read(&self.lists, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
