use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wikimedia_consumer::config::Config;
use wikimedia_consumer::consumer::WikimediaConsumer;
use wikimedia_consumer::db;
use wikimedia_consumer::store::PgEventStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wikimedia_consumer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting wikimedia-consumer");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        topic = %config.topic,
        group_id = %config.group_id,
        dedupe = config.dedupe_by_content_hash,
        "Configuration loaded"
    );

    let pool = db::init_pool(&config)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Running database migrations");
    db::MIGRATOR
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let store = Arc::new(PgEventStore::new(pool, config.dedupe_by_content_hash));
    let consumer = WikimediaConsumer::new(&config, store)?;

    consumer.run().await.context("Consumer loop failed")
}
