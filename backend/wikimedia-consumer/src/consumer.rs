//! Kafka listener: one store write per received message.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::store::{EventStore, SaveOutcome};

/// Persist one raw payload. The payload is opaque text; it is stored exactly
/// as received.
pub async fn handle_payload(store: &dyn EventStore, payload: &str) -> AppResult<SaveOutcome> {
    let outcome = store.save(payload).await?;
    match outcome {
        SaveOutcome::Saved(id) => {
            info!(id, bytes = payload.len(), "event persisted");
        }
        SaveOutcome::Duplicate => {
            debug!(bytes = payload.len(), "duplicate event skipped");
        }
    }
    Ok(outcome)
}

/// Consumer-group subscriber over the event topic.
///
/// Offsets are auto-committed on the broker client's default schedule, so the
/// delivery contract is the broker's: a crash between receipt and save loses
/// the message, a crash between save and commit redelivers it.
pub struct WikimediaConsumer {
    consumer: StreamConsumer,
    store: Arc<dyn EventStore>,
    topic: String,
}

impl WikimediaConsumer {
    pub fn new(config: &Config, store: Arc<dyn EventStore>) -> AppResult<Self> {
        info!(
            brokers = %config.kafka_brokers,
            group_id = %config.group_id,
            topic = %config.topic,
            "initializing consumer"
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(AppError::Kafka)?;

        consumer.subscribe(&[&config.topic]).map_err(AppError::Kafka)?;
        info!(topic = %config.topic, "subscribed");

        Ok(Self {
            consumer,
            store,
            topic: config.topic.clone(),
        })
    }

    /// Long-running poll loop; spawn in a tokio task.
    pub async fn run(&self) -> AppResult<()> {
        info!(topic = %self.topic, "consumer loop started");

        loop {
            match self.consumer.recv().await {
                Ok(msg) => {
                    let partition = msg.partition();
                    let offset = msg.offset();

                    let payload = match msg.payload_view::<str>() {
                        Some(Ok(text)) => text,
                        Some(Err(_)) => {
                            warn!(partition, offset, "message payload is not utf-8, skipping");
                            continue;
                        }
                        None => {
                            warn!(partition, offset, "message has no payload, skipping");
                            continue;
                        }
                    };

                    debug!(partition, offset, bytes = payload.len(), "message received");

                    // A failed save is logged and the loop moves on; whether
                    // the message comes back is down to commit timing.
                    if let Err(err) = handle_payload(self.store.as_ref(), payload).await {
                        error!(partition, offset, error = %err, "failed to persist event");
                    }
                }
                Err(err) => {
                    error!(error = %err, "kafka consumer error");
                    // Avoid a tight error loop while the broker is unreachable.
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}
