use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub kafka_brokers: String,
    pub topic: String,
    pub group_id: String,
    /// When enabled, a SHA-256 content hash deduplicates redelivered
    /// payloads; when disabled (the default), redelivery produces duplicate
    /// rows, matching the historical behavior.
    pub dedupe_by_content_hash: bool,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let kafka_brokers =
            env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".into());
        let topic =
            env::var("KAFKA_TOPIC").unwrap_or_else(|_| "wikimedia.recentchange".into());
        let group_id =
            env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "wikimedia-consumer-v1".into());

        let dedupe_by_content_hash = env::var("DEDUPE_BY_CONTENT_HASH")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let db_max_connections: u32 = parse_or("DB_MAX_CONNECTIONS", 10)?;
        let db_acquire_timeout_secs: u64 = parse_or("DB_ACQUIRE_TIMEOUT_SECS", 10)?;

        Ok(Self {
            database_url,
            kafka_brokers,
            topic,
            group_id,
            dedupe_by_content_hash,
            db_max_connections,
            db_acquire_timeout: Duration::from_secs(db_acquire_timeout_secs),
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            kafka_brokers: "localhost:9092".into(),
            topic: "wikimedia.recentchange".into(),
            group_id: "wikimedia-consumer-v1".into(),
            dedupe_by_content_hash: false,
            db_max_connections: 10,
            db_acquire_timeout: Duration::from_secs(10),
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
    fn missing_numeric_env_value_uses_default() {
        let got: u32 = parse_or("CONSUMER_CFG_TEST_UNSET", 10).unwrap();
        assert_eq!(got, 10);
    }

    #[test]
    fn malformed_numeric_env_value_is_a_config_error() {
        env::set_var("CONSUMER_CFG_TEST_MALFORMED", "lots");
        let got: Result<u32, _> = parse_or("CONSUMER_CFG_TEST_MALFORMED", 10);
        env::remove_var("CONSUMER_CFG_TEST_MALFORMED");
        assert!(matches!(got, Err(AppError::Config(_))));
    }

    #[test]
    fn test_defaults_preserve_duplicate_rows_behavior() {
        let cfg = Config::test_defaults();
        assert!(!cfg.dedupe_by_content_hash);
        assert_eq!(cfg.group_id, "wikimedia-consumer-v1");
    }
}
