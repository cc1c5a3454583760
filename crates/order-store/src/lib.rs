pub mod memory;
pub mod postgres_order_store;

pub use memory::InMemoryOrderStore;
pub use postgres_order_store::PostgresOrderStore;

use async_trait::async_trait;
use domain::Order;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;

/// Result of a [`OrderStore::save`] call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// All four relations were written and committed.
    Inserted,
    /// An aggregate with this `order_uid` was already committed; nothing changed.
    AlreadyExists,
    /// The payment `transaction` belongs to another order; the transaction
    /// was rolled back and nothing changed.
    TransactionConflict,
}

impl SaveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveOutcome::Inserted => "inserted",
            SaveOutcome::AlreadyExists => "already_exists",
            SaveOutcome::TransactionConflict => "transaction_conflict",
        }
    }
}

/// Durable, transactional persistence of the order aggregate
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Write the whole aggregate atomically. Replays of an already
    /// committed `order_uid` or payment `transaction` are successful no-ops.
    async fn save(&self, order: &Order) -> Result<SaveOutcome, StoreError>;

    /// Reconstruct one aggregate, or `StoreError::NotFound`
    async fn load(&self, order_uid: &str) -> Result<Order, StoreError>;

    /// Reconstruct every persisted aggregate (used for cache warm-up)
    async fn load_all(&self) -> Result<Vec<Order>, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Order {order_uid} has too many items ({count})")]
    TooManyItems { order_uid: String, count: usize },

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Apply the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(StoreError::NotFound("abc".to_string()).is_not_found());
        assert!(!StoreError::Database(sqlx::Error::PoolTimedOut).is_not_found());
        assert!(!StoreError::Timeout(Duration::from_secs(1)).is_not_found());
    }

    #[test]
    fn test_error_messages() {
        let err = StoreError::NotFound("b563feb7".to_string());
        assert_eq!(err.to_string(), "Order not found: b563feb7");
    }
}
