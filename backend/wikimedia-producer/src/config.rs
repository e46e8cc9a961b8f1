use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::AppError;

pub const DEFAULT_STREAM_URL: &str = "https://stream.wikimedia.org/v2/stream/recentchange";

/// What the bridge worker does when a publish fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and move on to the next event (the historical behavior).
    Drop,
    /// Retry a bounded number of times with a fixed delay, then drop.
    Retry,
    /// Terminate the streaming session.
    Stop,
}

impl FailurePolicy {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.to_ascii_lowercase().as_str() {
            "drop" => Ok(FailurePolicy::Drop),
            "retry" => Ok(FailurePolicy::Retry),
            "stop" => Ok(FailurePolicy::Stop),
            other => Err(AppError::Config(format!(
                "PUBLISH_FAILURE_POLICY must be drop|retry|stop, got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub stream_url: String,
    pub kafka_brokers: String,
    pub topic: String,
    /// How long one streaming session is held open before unconditional teardown.
    pub session_duration: Duration,
    pub channel_capacity: usize,
    pub failure_policy: FailurePolicy,
    pub publish_retry_attempts: u32,
    pub publish_retry_delay: Duration,
    pub publish_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let stream_url =
            env::var("WIKIMEDIA_STREAM_URL").unwrap_or_else(|_| DEFAULT_STREAM_URL.into());
        let kafka_brokers =
            env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".into());
        let topic =
            env::var("KAFKA_TOPIC").unwrap_or_else(|_| "wikimedia.recentchange".into());

        let session_duration_secs: u64 = parse_or("SESSION_DURATION_SECS", 600)?;
        let channel_capacity: usize = parse_or("EVENT_CHANNEL_CAPACITY", 1024)?;
        if channel_capacity == 0 {
            return Err(AppError::Config(
                "EVENT_CHANNEL_CAPACITY must be at least 1".into(),
            ));
        }

        let failure_policy = match env::var("PUBLISH_FAILURE_POLICY") {
            Ok(value) => FailurePolicy::parse(&value)?,
            Err(_) => FailurePolicy::Drop,
        };

        let publish_retry_attempts: u32 = parse_or("PUBLISH_RETRY_ATTEMPTS", 3)?;
        let publish_retry_delay_ms: u64 = parse_or("PUBLISH_RETRY_DELAY_MS", 500)?;
        let publish_timeout_ms: u64 = parse_or("PUBLISH_TIMEOUT_MS", 10_000)?;
        let backoff_base_ms: u64 = parse_or("RECONNECT_BACKOFF_BASE_MS", 1_000)?;
        let backoff_max_ms: u64 = parse_or("RECONNECT_BACKOFF_MAX_MS", 30_000)?;

        Ok(Self {
            stream_url,
            kafka_brokers,
            topic,
            session_duration: Duration::from_secs(session_duration_secs),
            channel_capacity,
            failure_policy,
            publish_retry_attempts,
            publish_retry_delay: Duration::from_millis(publish_retry_delay_ms),
            publish_timeout: Duration::from_millis(publish_timeout_ms),
            backoff_base: Duration::from_millis(backoff_base_ms),
            backoff_max: Duration::from_millis(backoff_max_ms),
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            stream_url: DEFAULT_STREAM_URL.into(),
            kafka_brokers: "localhost:9092".into(),
            topic: "wikimedia.recentchange".into(),
            session_duration: Duration::from_secs(600),
            channel_capacity: 1024,
            failure_policy: FailurePolicy::Drop,
            publish_retry_attempts: 3,
            publish_retry_delay: Duration::from_millis(10),
            publish_timeout: Duration::from_millis(100),
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(40),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_policy_parses_known_values() {
        assert_eq!(FailurePolicy::parse("drop").unwrap(), FailurePolicy::Drop);
        assert_eq!(FailurePolicy::parse("RETRY").unwrap(), FailurePolicy::Retry);
        assert_eq!(FailurePolicy::parse("Stop").unwrap(), FailurePolicy::Stop);
    }

    #[test]
    fn failure_policy_rejects_unknown_values() {
        assert!(FailurePolicy::parse("dead-letter").is_err());
        assert!(FailurePolicy::parse("").is_err());
    }

    #[test]
    fn test_defaults_are_consistent() {
        let cfg = Config::test_defaults();
        assert_eq!(cfg.failure_policy, FailurePolicy::Drop);
        assert!(cfg.channel_capacity > 0);
        assert_eq!(cfg.session_duration, Duration::from_secs(600));
    }
}
