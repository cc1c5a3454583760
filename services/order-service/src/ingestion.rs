//! Consumer loop: poll, decode, hand to the orchestrator, then commit.
//!
//! An offset is committed only after `process_order` returned `Ok`, so a
//! crash in between leads to redelivery, which the store absorbs as a
//! replay. Undecodable payloads and failed writes are left uncommitted.

use common::metrics::record_consumer_message;
use domain::Order;
use messaging::{InboundMessage, MessageSource};
use orchestrator::OrderService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    /// Upper bound on a single poll; also bounds how long shutdown takes to be noticed
    pub poll_timeout: Duration,
    /// Pause after a transport error before polling again
    pub error_backoff: Duration,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_millis(500),
        }
    }
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionStats {
    /// Messages the orchestrator accepted
    pub processed: u64,
    /// Messages that could not be decoded
    pub skipped: u64,
    /// Messages whose processing returned an error
    pub failed: u64,
    pub committed: u64,
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    // A dropped sender also means stop.
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Run until `shutdown` carries `true` or its sender is dropped.
///
/// The signal is checked between messages, so a message already handed to
/// the orchestrator is always finished before the loop returns.
pub async fn run(
    source: &dyn MessageSource,
    service: Arc<dyn OrderService>,
    options: IngestionOptions,
    mut shutdown: watch::Receiver<bool>,
) -> IngestionStats {
    let mut stats = IngestionStats::default();
    info!("Starting order ingestion loop");

    while !shutdown_requested(&shutdown) {
        let message = match source.poll(options.poll_timeout).await {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                error!("Error polling Kafka: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(options.error_backoff) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
        };

        handle_message(source, service.as_ref(), &message, &mut stats).await;
    }

    info!(
        processed = stats.processed,
        skipped = stats.skipped,
        failed = stats.failed,
        committed = stats.committed,
        "Order ingestion loop stopped"
    );
    stats
}

async fn handle_message(
    source: &dyn MessageSource,
    service: &dyn OrderService,
    message: &InboundMessage,
    stats: &mut IngestionStats,
) {
    let order = match Order::from_slice(&message.payload) {
        Ok(order) => order,
        Err(e) => {
            warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                "Skipping undecodable message: {}",
                e
            );
            record_consumer_message("decode_error");
            stats.skipped += 1;
            return;
        }
    };

    let order_uid = order.order_uid.clone();
    if let Err(e) = service.process_order(order).await {
        error!(
            offset = message.offset,
            "Failed to process order {}, leaving offset uncommitted: {}", order_uid, e
        );
        record_consumer_message("process_error");
        stats.failed += 1;
        return;
    }
    stats.processed += 1;

    match source.commit(message).await {
        Ok(()) => {
            debug!("Order {} acknowledged at offset {}", order_uid, message.offset);
            record_consumer_message("committed");
            stats.committed += 1;
        }
        Err(e) => {
            error!("Failed to commit offset {}: {}", message.offset, e);
            record_consumer_message("commit_error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::{Delivery, Item, Payment};
    use messaging::ConsumerError;
    use order_cache::LruOrderCache;
    use order_store::{InMemoryOrderStore, StoreError};
    use orchestrator::CachedOrderService;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Step = Result<Option<InboundMessage>, ConsumerError>;

    /// Replays a fixed script of poll results, then requests shutdown
    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        commits: Mutex<Vec<i64>>,
        fail_commits: bool,
        shutdown: watch::Sender<bool>,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> (Self, watch::Receiver<bool>) {
            let (tx, rx) = watch::channel(false);
            let source = Self {
                steps: Mutex::new(steps.into()),
                commits: Mutex::new(Vec::new()),
                fail_commits: false,
                shutdown: tx,
            };
            (source, rx)
        }

        fn committed_offsets(&self) -> Vec<i64> {
            self.commits.lock().unwrap().clone()
        }

        fn remaining(&self) -> usize {
            self.steps.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageSource for ScriptedSource {
        async fn poll(&self, _timeout: Duration) -> Result<Option<InboundMessage>, ConsumerError> {
            let next = self.steps.lock().unwrap().pop_front();
            match next {
                Some(step) => step,
                None => {
                    let _ = self.shutdown.send(true);
                    Ok(None)
                }
            }
        }

        async fn commit(&self, message: &InboundMessage) -> Result<(), ConsumerError> {
            if self.fail_commits {
                return Err(transport_error());
            }
            self.commits.lock().unwrap().push(message.offset);
            Ok(())
        }
    }

    fn transport_error() -> ConsumerError {
        ConsumerError::NoPayload {
            topic: "orders".to_string(),
            partition: 0,
            offset: -1,
        }
    }

    fn order(uid: &str) -> Order {
        Order {
            order_uid: uid.to_string(),
            delivery: Delivery {
                name: "John".to_string(),
                phone: "1234567890".to_string(),
                ..Default::default()
            },
            payment: Payment {
                transaction: format!("tx-{}", uid),
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

    fn message(offset: i64, payload: Vec<u8>) -> Step {
        Ok(Some(InboundMessage {
            topic: "orders".to_string(),
            partition: 0,
            offset,
            key: None,
            payload,
        }))
    }

    fn order_message(offset: i64, uid: &str) -> Step {
        message(offset, serde_json::to_vec(&order(uid)).unwrap())
    }

    fn service(store: Arc<InMemoryOrderStore>) -> Arc<dyn OrderService> {
        Arc::new(CachedOrderService::new(
            store,
            Arc::new(LruOrderCache::new(100).unwrap()),
        ))
    }

    fn fast_options() -> IngestionOptions {
        IngestionOptions {
            poll_timeout: Duration::from_millis(10),
            error_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_commits_after_successful_processing() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (source, shutdown) = ScriptedSource::new(vec![
            order_message(0, "a"),
            Ok(None),
            order_message(1, "b"),
        ]);

        let stats = run(&source, service(store.clone()), fast_options(), shutdown).await;

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.committed, 2);
        assert_eq!(source.committed_offsets(), vec![0, 1]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_message_is_skipped_without_commit() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (source, shutdown) = ScriptedSource::new(vec![
            message(0, b"not json".to_vec()),
            message(1, b"[1, 2, 3]".to_vec()),
            order_message(2, "a"),
        ]);

        let stats = run(&source, service(store.clone()), fast_options(), shutdown).await;

        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.processed, 1);
        assert_eq!(source.committed_offsets(), vec![2]);
    }

    #[tokio::test]
    async fn test_invalid_order_is_committed_without_persisting() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (source, shutdown) =
            ScriptedSource::new(vec![message(0, br#"{"order_uid":"","items":[]}"#.to_vec())]);

        let stats = run(&source, service(store.clone()), fast_options(), shutdown).await;

        assert_eq!(stats.processed, 1);
        assert_eq!(source.committed_offsets(), vec![0]);
        assert_eq!(store.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_offset_uncommitted() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.set_unavailable(true);
        let (source, shutdown) = ScriptedSource::new(vec![order_message(0, "a")]);

        let stats = run(&source, service(store.clone()), fast_options(), shutdown).await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.committed, 0);
        assert!(source.committed_offsets().is_empty());
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (source, shutdown) =
            ScriptedSource::new(vec![order_message(0, "a"), order_message(0, "a")]);

        let stats = run(&source, service(store.clone()), fast_options(), shutdown).await;

        assert_eq!(stats.committed, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_errors_do_not_stop_the_loop() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (source, shutdown) = ScriptedSource::new(vec![
            Err(transport_error()),
            Err(transport_error()),
            order_message(5, "a"),
        ]);

        let stats = run(&source, service(store.clone()), fast_options(), shutdown).await;

        assert_eq!(stats.processed, 1);
        assert_eq!(source.committed_offsets(), vec![5]);
    }

    #[tokio::test]
    async fn test_commit_failure_is_not_fatal() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (mut source, shutdown) =
            ScriptedSource::new(vec![order_message(0, "a"), order_message(1, "b")]);
        source.fail_commits = true;

        let stats = run(&source, service(store.clone()), fast_options(), shutdown).await;

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.committed, 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_stops_before_polling_when_already_cancelled() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (source, shutdown) = ScriptedSource::new(vec![order_message(0, "a")]);
        source.shutdown.send(true).unwrap();

        let stats = run(&source, service(store.clone()), fast_options(), shutdown).await;

        assert_eq!(stats, IngestionStats::default());
        assert_eq!(store.save_calls(), 0);
    }

    /// Requests shutdown from inside `process_order`, then finishes the write
    struct CancelDuringProcessing {
        source: Arc<ScriptedSource>,
        inner: Arc<dyn OrderService>,
    }

    #[async_trait]
    impl OrderService for CancelDuringProcessing {
        async fn process_order(&self, order: Order) -> Result<(), StoreError> {
            self.source.shutdown.send(true).unwrap();
            tokio::task::yield_now().await;
            self.inner.process_order(order).await
        }

        async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError> {
            self.inner.get_order(order_uid).await
        }

        async fn load_cache_from_db(&self) -> Result<usize, StoreError> {
            self.inner.load_cache_from_db().await
        }
    }

    #[tokio::test]
    async fn test_shutdown_lets_in_flight_message_finish() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (source, shutdown) =
            ScriptedSource::new(vec![order_message(0, "a"), order_message(1, "b")]);
        let source = Arc::new(source);
        let cancelling: Arc<dyn OrderService> = Arc::new(CancelDuringProcessing {
            source: source.clone(),
            inner: service(store.clone()),
        });

        let stats = run(source.as_ref(), cancelling, fast_options(), shutdown).await;

        assert_eq!(stats.processed, 1);
        assert_eq!(stats.committed, 1);
        assert_eq!(source.committed_offsets(), vec![0]);
        assert_eq!(source.remaining(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_the_loop() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (source, _) = ScriptedSource::new(Vec::new());
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let stats = run(&source, service(store), fast_options(), rx).await;
        assert_eq!(stats, IngestionStats::default());
    }
}
