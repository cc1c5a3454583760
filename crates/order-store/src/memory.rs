use super::{OrderStore, SaveOutcome, StoreError};
use async_trait::async_trait;
use domain::Order;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    orders: HashMap<String, Order>,
    // payment transaction -> owning order_uid
    transactions: HashMap<String, String>,
}

/// Process-local order store with the same replay semantics as
/// [`PostgresOrderStore`](crate::PostgresOrderStore).
///
/// Every call is counted, and the store can be switched into an
/// unavailable state, which makes it the test double for the
/// orchestrator, the ingestion loop and the HTTP layer.
#[derive(Default)]
pub struct InMemoryOrderStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    save_calls: AtomicUsize,
    load_calls: AtomicUsize,
    load_all_calls: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store that already holds `orders`, without counting calls
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.lock();
            for order in orders {
                tables
                    .transactions
                    .insert(order.payment.transaction.clone(), order.order_uid.clone());
                tables.orders.insert(order.order_uid.clone(), order);
            }
        }
        store
    }

    /// Simulate a lost database connection
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn load_all_calls(&self) -> usize {
        self.load_all_calls.load(Ordering::SeqCst)
    }

    /// Total number of calls of any kind
    pub fn total_calls(&self) -> usize {
        self.save_calls() + self.load_calls() + self.load_all_calls()
    }

    /// Whether `order_uid` is committed, without counting a call
    pub fn contains(&self, order_uid: &str) -> bool {
        self.lock().orders.contains_key(order_uid)
    }

    pub fn len(&self) -> usize {
        self.lock().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // A panic while holding the lock cannot leave a half-written
        // aggregate behind, so the data is still usable.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, order: &Order) -> Result<SaveOutcome, StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut tables = self.lock();
        if tables.orders.contains_key(&order.order_uid) {
            return Ok(SaveOutcome::AlreadyExists);
        }
        if tables.transactions.contains_key(&order.payment.transaction) {
            return Ok(SaveOutcome::TransactionConflict);
        }

        tables
            .transactions
            .insert(order.payment.transaction.clone(), order.order_uid.clone());
        tables.orders.insert(order.order_uid.clone(), order.clone());
        Ok(SaveOutcome::Inserted)
    }

    async fn load(&self, order_uid: &str) -> Result<Order, StoreError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        self.lock()
            .orders
            .get(order_uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn load_all(&self) -> Result<Vec<Order>, StoreError> {
        self.load_all_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        Ok(self.lock().orders.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Delivery, Item, Payment};

    fn order(uid: &str, transaction: &str) -> Order {
        Order {
            order_uid: uid.to_string(),
            delivery: Delivery {
                name: "John".to_string(),
                phone: "1234567890".to_string(),
                ..Default::default()
            },
            payment: Payment {
                transaction: transaction.to_string(),
                amount: 1000,
                ..Default::default()
            },
            items: vec![Item {
                chrt_id: 1,
                price: 500,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = InMemoryOrderStore::new();
        let outcome = store.save(&order("uid-1", "tx-1")).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Inserted);

        let loaded = store.load("uid-1").await.unwrap();
        assert_eq!(loaded, order("uid-1", "tx-1"));
    }

    #[tokio::test]
    async fn test_replay_keeps_first_write() {
        let store = InMemoryOrderStore::new();
        store.save(&order("uid-1", "tx-1")).await.unwrap();

        let mut replay = order("uid-1", "tx-1");
        replay.track_number = "CHANGED".to_string();
        let outcome = store.save(&replay).await.unwrap();

        assert_eq!(outcome, SaveOutcome::AlreadyExists);
        assert_eq!(store.len(), 1);
        assert_eq!(store.load("uid-1").await.unwrap().track_number, "");
    }

    #[tokio::test]
    async fn test_duplicate_transaction_is_noop() {
        let store = InMemoryOrderStore::new();
        store.save(&order("uid-1", "tx-1")).await.unwrap();

        let outcome = store.save(&order("uid-2", "tx-1")).await.unwrap();
        assert_eq!(outcome, SaveOutcome::TransactionConflict);
        assert!(store.load("uid-2").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = InMemoryOrderStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.save(&order("uid-1", "tx-1")).await,
            Err(StoreError::Database(_))
        ));
        assert_eq!(store.save_calls(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_with_orders_does_not_count_calls() {
        let store = InMemoryOrderStore::with_orders(vec![order("a", "tx-a"), order("b", "tx-b")]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_calls(), 0);
        assert_eq!(store.load_all().await.unwrap().len(), 2);
        assert_eq!(store.load_all_calls(), 1);
    }
}
