use crate::OrderCache;
use common::metrics::set_cache_entries;
use domain::Order;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Plain map cache that never evicts. Memory grows with the number of
/// distinct orders seen, so it only suits small or bounded data sets.
#[derive(Default)]
pub struct UnboundedOrderCache {
    inner: Mutex<HashMap<String, Order>>,
}

impl UnboundedOrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Order>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OrderCache for UnboundedOrderCache {
    fn get(&self, order_uid: &str) -> Option<Order> {
        self.lock().get(order_uid).cloned()
    }

    fn put(&self, order_uid: String, order: Order) {
        let mut map = self.lock();
        map.insert(order_uid, order);
        set_cache_entries(map.len());
    }

    fn put_all(&self, orders: Vec<Order>) {
        let mut map = self.lock();
        map.extend(orders.into_iter().map(|o| (o.order_uid.clone(), o)));
        set_cache_entries(map.len());
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn capacity(&self) -> Option<usize> {
        None
    }
}
