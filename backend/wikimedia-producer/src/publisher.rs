//! Broker publisher: one key-less record per stream event.

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Outbound publish seam. The bridge worker owns the failure policy; a sink
/// only reports success or failure.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, payload: &str) -> AppResult<()>;
}

/// Kafka-backed sink over a `FutureProducer`.
///
/// Records are published without a key, so partition assignment is whatever
/// the broker's default partitioner yields.
pub struct KafkaEventSink {
    producer: FutureProducer,
    topic: String,
    publish_timeout: Duration,
}

impl KafkaEventSink {
    pub fn new(config: &Config) -> AppResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("message.timeout.ms", "30000")
            .set("request.timeout.ms", "30000")
            .create()
            .map_err(AppError::Kafka)?;

        info!(brokers = %config.kafka_brokers, topic = %config.topic, "kafka producer created");

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            publish_timeout: config.publish_timeout,
        })
    }
}

#[async_trait]
impl EventSink for KafkaEventSink {
    async fn publish(&self, payload: &str) -> AppResult<()> {
        let record = FutureRecord::<(), _>::to(&self.topic).payload(payload);

        self.producer
            .send(record, self.publish_timeout)
            .await
            .map_err(|(err, _)| AppError::Kafka(err))?;

        debug!(topic = %self.topic, bytes = payload.len(), "published event");
        Ok(())
    }
}
