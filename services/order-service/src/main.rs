use anyhow::{Context, Result};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use common::AppConfig;
use futures_util::stream::StreamExt;
use messaging::KafkaOrderConsumer;
use orchestrator::{CachedOrderService, OrderService};
use order_cache::build_cache;
use order_service::{create_router, ingestion, AppState, IngestionOptions};
use order_store::{run_migrations, OrderStore, PostgresOrderStore};
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_telemetry(TelemetryConfig::from_env("order-service"))
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    info!("Starting Order Service...");
    info!("Configuration:");
    info!("  Kafka Brokers: {}", config.kafka.brokers);
    info!("  Kafka Topic: {}", config.kafka.topic);
    info!("  Consumer Group: {}", config.kafka.group_id);
    info!("  Cache: {:?} (capacity {})", config.cache.kind, config.cache.capacity);
    info!("  Port: {}", config.http.port);

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url())
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool).await?;
    info!("Database connected and migrated");

    let store: Arc<dyn OrderStore> = Arc::new(PostgresOrderStore::new(
        pool.clone(),
        config.database.query_timeout(),
    ));
    let cache = build_cache(config.cache.kind, config.cache.capacity)?;
    let service: Arc<dyn OrderService> = Arc::new(CachedOrderService::new(store, cache));

    // Warm the cache before anything can read or write
    let loaded = service
        .load_cache_from_db()
        .await
        .context("Failed to load cache from database")?;
    info!("Cache warmed with {} orders", loaded);

    let consumer = KafkaOrderConsumer::new(
        &config.kafka.brokers,
        &config.kafka.group_id,
        &[&config.kafka.topic],
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Setup signal handling
    let signals = Signals::new([SIGTERM, SIGINT])?;
    let handle = signals.handle();
    let signal_task = tokio::spawn(async move {
        let mut signals = signals;
        if let Some(signal) = signals.next().await {
            info!("Received signal {}, shutting down...", signal);
        }
        let _ = shutdown_tx.send(true);
    });

    let options = IngestionOptions {
        poll_timeout: config.kafka.poll_timeout(),
        ..Default::default()
    };
    let ingestion_service = service.clone();
    let ingestion_shutdown = shutdown_rx.clone();
    let ingestion_task = tokio::spawn(async move {
        ingestion::run(&consumer, ingestion_service, options, ingestion_shutdown).await
    });

    let app = create_router(AppState::new(service), &config.http.front_origin)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    info!("Order service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(|e| {
            error!("Server error: {}", e);
            e
        })?;

    handle.close();
    signal_task.abort();

    match ingestion_task.await {
        Ok(stats) => info!("Ingestion finished: {:?}", stats),
        Err(e) => error!("Ingestion task failed: {}", e),
    }

    info!("Shutting down order service...");
    pool.close().await;
    shutdown_telemetry();
    info!("Order service stopped");

    Ok(())
}
