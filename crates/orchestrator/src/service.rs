use async_trait::async_trait;
use common::metrics::{record_cache_request, record_order_processed};
use domain::Order;
use order_cache::OrderCache;
use order_store::{OrderStore, SaveOutcome, StoreError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Operations the ingestion loop and the query surface call into
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Validate, persist and cache an inbound order.
    ///
    /// Structurally invalid orders are dropped and reported as success so a
    /// poison message is acknowledged instead of redelivered forever. An
    /// error is returned only when the store itself fails.
    async fn process_order(&self, order: Order) -> Result<(), StoreError>;

    /// Cache-first lookup. Store errors, including `NotFound`, are returned
    /// unchanged and never cached.
    async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError>;

    /// Prime the cache with every persisted aggregate, returning how many
    /// were loaded
    async fn load_cache_from_db(&self) -> Result<usize, StoreError>;
}

pub struct CachedOrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
}

impl CachedOrderService {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<dyn OrderCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<dyn OrderCache> {
        &self.cache
    }

    /// After a replay the committed aggregate may differ from the one just
    /// received, so the cache is filled from the store.
    async fn cache_committed(&self, order_uid: &str) -> Result<(), StoreError> {
        match self.store.load(order_uid).await {
            Ok(committed) => {
                self.cache.put(order_uid.to_string(), committed);
                Ok(())
            }
            // Root row without its relations: nothing complete to cache.
            Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl OrderService for CachedOrderService {
    async fn process_order(&self, order: Order) -> Result<(), StoreError> {
        if let Err(reason) = order.validate() {
            warn!("Invalid order {:?} dropped: {}", order.order_uid, reason);
            record_order_processed("rejected");
            return Ok(());
        }

        let outcome = match self.store.save(&order).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to save order {}: {}", order.order_uid, e);
                record_order_processed("failed");
                return Err(e);
            }
        };

        match outcome {
            SaveOutcome::Inserted => {
                let order_uid = order.order_uid.clone();
                self.cache.put(order_uid.clone(), order);
                record_order_processed("persisted");
                info!("Order {} persisted and cached", order_uid);
            }
            SaveOutcome::AlreadyExists => {
                info!("Order {} was already persisted, refreshing cache", order.order_uid);
                self.cache_committed(&order.order_uid).await?;
                record_order_processed("replayed");
            }
            SaveOutcome::TransactionConflict => {
                warn!(
                    "Order {} not persisted: payment transaction {} is taken",
                    order.order_uid, order.payment.transaction
                );
                record_order_processed("duplicate_transaction");
            }
        }

        Ok(())
    }

    async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError> {
        if let Some(order) = self.cache.get(order_uid) {
            debug!("Cache hit for order {}", order_uid);
            record_cache_request(true);
            return Ok(order);
        }

        record_cache_request(false);
        debug!("Cache miss for order {}, querying store", order_uid);

        match self.store.load(order_uid).await {
            Ok(order) => {
                self.cache.put(order_uid.to_string(), order.clone());
                info!("Order {} fetched from store and cached", order_uid);
                Ok(order)
            }
            Err(StoreError::NotFound(uid)) => {
                info!("Order {} not found", uid);
                Err(StoreError::NotFound(uid))
            }
            Err(e) => {
                error!("Failed to load order {}: {}", order_uid, e);
                Err(e)
            }
        }
    }

    async fn load_cache_from_db(&self) -> Result<usize, StoreError> {
        let orders = self.store.load_all().await.map_err(|e| {
            error!("Failed to load orders for cache warm-up: {}", e);
            e
        })?;

        let count = orders.len();
        self.cache.put_all(orders);

        info!(
            "Loaded {} orders into cache ({} entries held)",
            count,
            self.cache.len()
        );
        Ok(count)
    }
}
