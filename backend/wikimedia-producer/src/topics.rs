//! Declarative topic provisioning, run once at startup.

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::types::RDKafkaErrorCode;
use tracing::info;

use crate::error::{AppError, AppResult};

/// An already-existing topic is success: provisioning is declarative and the
/// broker enforces idempotency.
fn is_benign_create_error(code: RDKafkaErrorCode) -> bool {
    matches!(code, RDKafkaErrorCode::TopicAlreadyExists)
}

/// Ensure the topic exists with default partitioning and replication.
pub async fn ensure_topic(brokers: &str, topic: &str) -> AppResult<()> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("request.timeout.ms", "10000")
        .create()
        .map_err(AppError::Kafka)?;

    let new_topic = NewTopic::new(topic, 1, TopicReplication::Fixed(1));
    let results = admin
        .create_topics([&new_topic], &AdminOptions::new())
        .await
        .map_err(AppError::Kafka)?;

    for result in results {
        match result {
            Ok(name) => info!(topic = %name, "topic created"),
            Err((name, code)) if is_benign_create_error(code) => {
                info!(topic = %name, "topic already exists");
            }
            Err((name, code)) => {
                return Err(AppError::TopicProvision(format!(
                    "create of '{name}' failed: {code}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_topic_is_not_an_error() {
        assert!(is_benign_create_error(RDKafkaErrorCode::TopicAlreadyExists));
    }

    #[test]
    fn other_create_failures_are_errors() {
        assert!(!is_benign_create_error(RDKafkaErrorCode::InvalidPartitions));
        assert!(!is_benign_create_error(
            RDKafkaErrorCode::TopicAuthorizationFailed
        ));
    }
}
