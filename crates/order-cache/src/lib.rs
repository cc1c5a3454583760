pub mod lru_cache;
pub mod unbounded;

pub use lru_cache::LruOrderCache;
pub use unbounded::UnboundedOrderCache;

use common::CacheKind;
use domain::Order;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache capacity must be greater than zero")]
    ZeroCapacity,
}

/// In-memory mapping from `order_uid` to the committed aggregate.
///
/// Implementations hold at most one entry per key and are safe to share
/// between the ingestion worker and concurrent HTTP handlers.
pub trait OrderCache: Send + Sync {
    /// Look up an order; a hit counts as a use for recency
    fn get(&self, order_uid: &str) -> Option<Order>;

    /// Insert or replace the entry for `order_uid`
    fn put(&self, order_uid: String, order: Order);

    /// Insert a batch under a single lock acquisition
    fn put_all(&self, orders: Vec<Order>) {
        for order in orders {
            self.put(order.order_uid.clone(), order);
        }
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` for caches that never evict
    fn capacity(&self) -> Option<usize>;
}

/// Build the cache selected by configuration
pub fn build_cache(kind: CacheKind, capacity: usize) -> Result<Arc<dyn OrderCache>, CacheError> {
    let cache: Arc<dyn OrderCache> = match kind {
        CacheKind::Lru => Arc::new(LruOrderCache::new(capacity)?),
        CacheKind::Unbounded => Arc::new(UnboundedOrderCache::new()),
    };

    tracing::info!(
        "Order cache initialized: {:?} (capacity: {:?})",
        kind,
        cache.capacity()
    );
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_lru_cache() {
        let cache = build_cache(CacheKind::Lru, 10).unwrap();
        assert_eq!(cache.capacity(), Some(10));
    }

    #[test]
    fn test_build_unbounded_cache() {
        let cache = build_cache(CacheKind::Unbounded, 10).unwrap();
        assert_eq!(cache.capacity(), None);
    }

    #[test]
    fn test_build_rejects_zero_capacity() {
        assert_eq!(
            build_cache(CacheKind::Lru, 0).err(),
            Some(CacheError::ZeroCapacity)
        );
    }
}
