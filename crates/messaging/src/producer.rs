use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Failed to create Kafka producer: {0}")]
    ProducerCreation(String),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to publish message: {0}")]
    PublishFailed(String),
}

/// Kafka publisher that writes JSON payloads to a single topic
pub struct OrderPublisher {
    producer: FutureProducer,
    topic: String,
}

impl OrderPublisher {
    /// Create a new OrderPublisher
    ///
    /// # Arguments
    /// * `brokers` - Comma-separated list of Kafka brokers (e.g., "localhost:9092")
    /// * `topic` - The topic to publish orders to
    ///
    /// # Example
    /// ```no_run
    /// use messaging::OrderPublisher;
    ///
    /// let publisher = OrderPublisher::new("localhost:9092", "orders".to_string())
    ///     .expect("Failed to create publisher");
    /// ```
    pub fn new(brokers: &str, topic: String) -> Result<Self, PublisherError> {
        debug!("Creating Kafka producer for brokers: {}", brokers);

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .set("retries", "3")
            .create()
            .map_err(|e| PublisherError::ProducerCreation(e.to_string()))?;

        Ok(Self { producer, topic })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Serialize `message` as JSON and publish it under `key`.
    /// Returns the partition and offset the broker assigned.
    pub async fn publish<T: Serialize>(
        &self,
        key: &str,
        message: &T,
    ) -> Result<(i32, i64), PublisherError> {
        let payload = serde_json::to_vec(message)?;
        self.publish_raw(key, &payload).await
    }

    /// Publish an already encoded payload
    pub async fn publish_raw(&self, key: &str, payload: &[u8]) -> Result<(i32, i64), PublisherError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
        {
            Ok((partition, offset)) => {
                debug!(
                    "Published {} to topic '{}', partition {}, offset {}",
                    key, self.topic, partition, offset
                );
                Ok((partition, offset))
            }
            Err((err, _)) => {
                warn!("Failed to publish {}: {}", key, err);
                Err(PublisherError::PublishFailed(err.to_string()))
            }
        }
    }

    /// Wait for in-flight messages to be delivered
    pub fn flush(&self, timeout: Duration) -> Result<(), PublisherError> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| PublisherError::PublishFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publisher_creation_with_invalid_brokers() {
        // Creation doesn't validate the connection
        let result = OrderPublisher::new("", "orders".to_string());
        assert!(result.is_ok());
        assert_eq!(result.unwrap().topic(), "orders");
    }

    #[test]
    fn test_serialization_error_is_wrapped() {
        let err: PublisherError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.to_string().starts_with("Failed to serialize message"));
    }
}
