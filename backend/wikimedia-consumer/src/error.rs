use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl AppError {
    /// Whether the operation may succeed on a later attempt. A retryable
    /// store failure leaves the message to the broker's redelivery policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            AppError::Kafka(_) => true,
            AppError::Config(_) | AppError::InvalidMessage(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeouts_are_retryable() {
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn malformed_messages_are_not_retryable() {
        assert!(!AppError::InvalidMessage("not utf-8".into()).is_retryable());
        assert!(!AppError::Config("DATABASE_URL missing".into()).is_retryable());
    }
}
