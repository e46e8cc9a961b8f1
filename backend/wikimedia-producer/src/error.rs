use rdkafka::types::RDKafkaErrorCode;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("stream connect failure: {0}")]
    StreamConnect(String),

    #[error("stream transport error: {0}")]
    StreamTransport(String),

    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("publish timed out after {timeout_ms}ms")]
    PublishTimeout { timeout_ms: u64 },

    #[error("topic provisioning failed: {0}")]
    TopicProvision(String),
}

impl AppError {
    /// Whether the bridge worker may retry the failed operation.
    ///
    /// Transport and timeout failures are transient; configuration and
    /// provisioning failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::StreamConnect(_)
            | AppError::StreamTransport(_)
            | AppError::PublishTimeout { .. } => true,
            AppError::Kafka(e) => matches!(
                e,
                rdkafka::error::KafkaError::MessageProduction(
                    RDKafkaErrorCode::QueueFull
                        | RDKafkaErrorCode::MessageTimedOut
                        | RDKafkaErrorCode::BrokerTransportFailure
                        | RDKafkaErrorCode::AllBrokersDown
                )
            ),
            AppError::Config(_) | AppError::TopicProvision(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(AppError::StreamTransport("reset by peer".into()).is_retryable());
        assert!(AppError::PublishTimeout { timeout_ms: 5000 }.is_retryable());
    }

    #[test]
    fn config_errors_are_not_retryable() {
        assert!(!AppError::Config("KAFKA_BROKERS missing".into()).is_retryable());
        assert!(!AppError::TopicProvision("denied".into()).is_retryable());
    }
}
