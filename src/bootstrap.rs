//! Wiring from [`AppConfig`] to a running [`TransferEngine`]

use std::sync::Arc;

use anyhow::Context;

use crate::config::{AppConfig, PublisherConfig, PublisherKind, StoreBackend, StoreConfig};
use crate::db::{Database, schema};
use crate::transfer::publisher::run_event_consumer;
use crate::transfer::{
    AccountStore, ChannelPublisher, EngineConfig, EventPublisher, HttpPublisher,
    InMemoryAccountStore, LogPublisher, PgAccountStore, TransferEngine,
};

/// Build the store, publisher and engine described by `config`.
///
/// Must run inside a tokio runtime: the channel publisher spawns its consumer.
pub async fn build_engine(config: &AppConfig) -> anyhow::Result<Arc<TransferEngine>> {
    let store = build_store(&config.store).await?;
    let publisher = build_publisher(&config.publisher)?;
    Ok(Arc::new(TransferEngine::new(
        store,
        publisher,
        EngineConfig::from_app_config(config),
    )))
}

async fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn AccountStore>> {
    match config.backend {
        StoreBackend::Memory => {
            let store = InMemoryAccountStore::new();
            for seed in &config.seed_accounts {
                store
                    .open_account(seed.id, seed.balance)
                    .with_context(|| format!("Failed to seed account {}", seed.id))?;
            }
            tracing::info!(
                accounts = config.seed_accounts.len(),
                "In-memory account store ready"
            );
            Ok(Arc::new(store))
        }
        StoreBackend::Postgres => {
            let url = config
                .postgres_url
                .as_deref()
                .context("store.postgres_url is required for the postgres backend")?;
            let db = Database::connect(url, config.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            if config.init_schema {
                schema::init_schema(db.pool()).await?;
            }
            for seed in &config.seed_accounts {
                schema::upsert_account(db.pool(), seed.id, seed.balance).await?;
            }
            tracing::info!(isolation = ?config.isolation, "PostgreSQL account store ready");
            Ok(Arc::new(PgAccountStore::with_isolation(
                db.pool().clone(),
                config.isolation,
            )))
        }
    }
}

fn build_publisher(config: &PublisherConfig) -> anyhow::Result<Arc<dyn EventPublisher>> {
    let publisher: Arc<dyn EventPublisher> = match config.kind {
        PublisherKind::Log => Arc::new(LogPublisher),
        PublisherKind::Channel => {
            let publisher = ChannelPublisher::new();
            tokio::spawn(run_event_consumer(publisher.subscribe()));
            Arc::new(publisher)
        }
        PublisherKind::Http => {
            let url = config
                .http_url
                .as_deref()
                .context("publisher.http_url is required for the http publisher")?;
            Arc::new(HttpPublisher::new(url, config.request_timeout())?)
        }
    };
    Ok(publisher)
}
