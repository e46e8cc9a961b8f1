use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wikimedia_producer::bridge::StreamSession;
use wikimedia_producer::config::Config;
use wikimedia_producer::publisher::KafkaEventSink;
use wikimedia_producer::sse::SseClient;
use wikimedia_producer::topics;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wikimedia_producer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting wikimedia-producer");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        stream_url = %config.stream_url,
        topic = %config.topic,
        session_secs = config.session_duration.as_secs(),
        failure_policy = ?config.failure_policy,
        "Configuration loaded"
    );

    topics::ensure_topic(&config.kafka_brokers, &config.topic)
        .await
        .context("Failed to provision topic")?;

    let source = Arc::new(SseClient::new(&config.stream_url)?);
    let sink = Arc::new(KafkaEventSink::new(&config)?);

    let session = StreamSession::new(config, source, sink);
    let report = session.run().await.context("Streaming session failed")?;

    tracing::info!(
        forwarded = report.forwarded,
        dropped = report.dropped,
        "Session complete, exiting; restart the process to resume streaming"
    );
    Ok(())
}
