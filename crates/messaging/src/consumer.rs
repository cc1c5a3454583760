use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Message at {topic}[{partition}]@{offset} has no payload")]
    NoPayload {
        topic: String,
        partition: i32,
        offset: i64,
    },

    #[error("Commit task failed: {0}")]
    CommitTask(#[from] tokio::task::JoinError),
}

/// One consumed record, detached from the client buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// Source of inbound messages with explicit acknowledgment
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait up to `timeout` for the next message. `Ok(None)` means the wait
    /// elapsed with nothing to read, which is not an error.
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, ConsumerError>;

    /// Acknowledge `message` so it is not redelivered to this group
    async fn commit(&self, message: &InboundMessage) -> Result<(), ConsumerError>;
}

/// Kafka consumer with auto-commit disabled; offsets move only through
/// [`MessageSource::commit`].
pub struct KafkaOrderConsumer {
    consumer: Arc<StreamConsumer>,
}

impl KafkaOrderConsumer {
    /// Create a new Kafka consumer subscribed to `topics`
    pub fn new(brokers: &str, group_id: &str, topics: &[&str]) -> Result<Self, ConsumerError> {
        info!(
            "Creating Kafka consumer with group_id: {}, topics: {:?}",
            group_id, topics
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", group_id)
            .set("bootstrap.servers", brokers)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "10000")
            .create()?;

        consumer.subscribe(topics)?;

        info!("Kafka consumer created successfully");
        Ok(Self {
            consumer: Arc::new(consumer),
        })
    }

    /// Get the underlying StreamConsumer for advanced usage
    pub fn inner(&self) -> &StreamConsumer {
        &self.consumer
    }
}

#[async_trait]
impl MessageSource for KafkaOrderConsumer {
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, ConsumerError> {
        let message = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => {
                debug!("No message received within {:?}", timeout);
                return Ok(None);
            }
            Ok(result) => result?,
        };

        debug!(
            "Received message from topic: {}, partition: {}, offset: {}",
            message.topic(),
            message.partition(),
            message.offset()
        );

        let payload = message.payload().ok_or_else(|| ConsumerError::NoPayload {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        })?;

        Ok(Some(InboundMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(|k| k.to_vec()),
            payload: payload.to_vec(),
        }))
    }

    async fn commit(&self, message: &InboundMessage) -> Result<(), ConsumerError> {
        let offsets = next_offsets(message)?;

        // A sync commit waits on the broker; keep it off the async workers.
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&offsets, CommitMode::Sync))
            .await??;
        debug!(
            "Committed offset {} for {}[{}]",
            message.offset + 1,
            message.topic,
            message.partition
        );
        Ok(())
    }
}

/// The committed offset is the next one to read
fn next_offsets(message: &InboundMessage) -> Result<TopicPartitionList, ConsumerError> {
    let mut offsets = TopicPartitionList::new();
    offsets.add_partition_offset(
        &message.topic,
        message.partition,
        Offset::Offset(message.offset + 1),
    )?;
    Ok(offsets)
}
