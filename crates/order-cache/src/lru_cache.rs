use crate::{CacheError, OrderCache};
use common::metrics::set_cache_entries;
use domain::Order;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Bounded cache with least-recently-used eviction.
///
/// A single mutex guards every read, write and eviction. `get` mutates
/// recency, so a read lock would not be enough anyway.
pub struct LruOrderCache {
    inner: Mutex<LruCache<String, Order>>,
    capacity: NonZeroUsize,
}

impl LruOrderCache {
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::ZeroCapacity)?;
        Ok(Self {
            inner: Mutex::new(LruCache::new(capacity)),
            capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Order>> {
        // Entries are whole clones, so a poisoned guard still holds consistent data.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check membership without touching recency
    pub fn contains(&self, order_uid: &str) -> bool {
        self.lock().contains(order_uid)
    }
}

impl OrderCache for LruOrderCache {
    fn get(&self, order_uid: &str) -> Option<Order> {
        self.lock().get(order_uid).cloned()
    }

    fn put(&self, order_uid: String, order: Order) {
        let mut cache = self.lock();
        if let Some((evicted, _)) = cache.push(order_uid, order) {
            if !cache.contains(&evicted) {
                debug!("Evicted order {} from cache", evicted);
            }
        }
        set_cache_entries(cache.len());
    }

    fn put_all(&self, orders: Vec<Order>) {
        let mut cache = self.lock();
        for order in orders {
            cache.put(order.order_uid.clone(), order);
        }
        set_cache_entries(cache.len());
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.capacity.get())
    }
}
