// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
//! Bounded, single-flight caches shared across epochs under one global MiB
//! budget: a `parking_lot::RwLock`-guarded `hashlink::LruCache` for the hot
//! set plus a `tokio::sync::OnceCell`-per-key in-flight table so concurrent
//! misses on the same key coalesce into one backing read.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use hashlink::LruCache;
use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;

use crate::errors::EngineError;

/// A bounded cache where concurrent misses on the same key share one
/// in-flight fetch instead of each issuing a redundant backing read.
pub struct SingleFlightCache<K, V> {
    lru: RwLock<LruCache<K, V>>,
    inflight: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: RwLock::new(LruCache::new(capacity.max(1))),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.lru.write().get(key).cloned()
    }

    /// Returns the cached value for `key`, or runs `fetch` to produce one.
    /// Concurrent callers for the same absent key coalesce onto a single
    /// `fetch` invocation.
    pub async fn get_or_try_insert_with<F, Fut>(&self, key: K, fetch: F) -> Result<V, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, EngineError>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let cell = {
            let mut inflight = self.inflight.lock();
            inflight.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let result = cell.get_or_try_init(fetch).await.map(|v| v.clone());
        self.inflight.lock().remove(&key);

        let value = result?;
        self.lru.write().insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.lru.read().len()
    }
}

/// Rough per-entry byte costs used to apportion a MiB budget across the
/// three cache kinds the epoch handle keeps.
const AVG_OBJECT_BYTES: usize = 2_048;
const AVG_SLOT_CID_BYTES: usize = 40;
const AVG_CID_OFFSET_BYTES: usize = 48;

/// Bundles the caches an [`crate::epoch::EpochHandle`] consults before every
/// lookup, all drawing from one global size budget.
pub struct EpochCaches {
    pub objects: SingleFlightCache<archive_car::Cid, archive_car::objects::Node>,
    pub slot_to_cid: SingleFlightCache<u64, archive_car::Cid>,
    pub cid_to_offset: SingleFlightCache<archive_car::Cid, (u64, u32)>,
}

impl EpochCaches {
    pub fn with_budget_mib(budget_mib: usize) -> Self {
        let budget_bytes = budget_mib.saturating_mul(1024 * 1024).max(1);
        // A fixed 50/25/25 split between object bodies, slot lookups, and
        // offset lookups; object bodies dominate the working set.
        let object_budget = budget_bytes / 2;
        let slot_budget = budget_bytes / 4;
        let offset_budget = budget_bytes - object_budget - slot_budget;

        Self {
            objects: SingleFlightCache::new((object_budget / AVG_OBJECT_BYTES).max(16)),
            slot_to_cid: SingleFlightCache::new((slot_budget / AVG_SLOT_CID_BYTES).max(16)),
            cid_to_offset: SingleFlightCache::new((offset_budget / AVG_CID_OFFSET_BYTES).max(16)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_misses_on_same_key_coalesce_to_one_fetch() {
        let cache: Arc<SingleFlightCache<u64, u64>> = Arc::new(SingleFlightCache::new(16));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_try_insert_with(1, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(42u64)
                    })
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hit_after_fetch_skips_the_closure() {
        let cache: SingleFlightCache<&str, &str> = SingleFlightCache::new(4);
        cache
            .get_or_try_insert_with("k", || async { Ok("v") })
            .await
            .unwrap();
        let result = cache
            .get_or_try_insert_with("k", || async { panic!("should not run") })
            .await;
        assert_eq!(result.unwrap(), "v");
    }
}
