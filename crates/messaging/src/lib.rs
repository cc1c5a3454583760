pub mod consumer;
pub mod producer;

pub use consumer::{ConsumerError, InboundMessage, KafkaOrderConsumer, MessageSource};
pub use producer::{OrderPublisher, PublisherError};
