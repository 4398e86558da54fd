use actix_web::dev::ServerHandle;
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, MessageProcessor, RetryPolicy, StreamConsumer};
use crate::cache::LruOrderCache;
use crate::config::Config;
use crate::http;
use crate::messaging::KafkaConnector;
use crate::metrics::Metrics;
use crate::repository::PostgresOrderRepository;
use crate::usecase::OrderUseCase;

// ============================================================================
// Application - wiring and lifecycle
// ============================================================================
//
// build():    pool -> repository -> cache -> use case -> processor ->
//             retry policy -> kafka connector -> consumer -> broker
// run():      warm the cache, start both HTTP listeners, start the broker
// shutdown(): stop HTTP, drain the broker, close the pool
//
// ============================================================================

const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct App {
    config: Config,
    metrics: Arc<Metrics>,
    repository: Arc<PostgresOrderRepository>,
    usecase: Arc<OrderUseCase>,
    broker: Broker,
    servers: Vec<ServerHandle>,
}

impl App {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        tracing::info!("Initializing metrics");
        let metrics = Arc::new(Metrics::new()?);

        tracing::info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.db.max_connections)
            .acquire_timeout(DB_ACQUIRE_TIMEOUT)
            .connect(&config.db.url)
            .await
            .context("failed to connect to PostgreSQL")?;

        let repository = Arc::new(PostgresOrderRepository::new(pool));
        repository
            .ensure_schema()
            .await
            .context("failed to create order schema")?;

        let cache = Arc::new(LruOrderCache::new(config.cache.limit));
        let usecase = Arc::new(
            OrderUseCase::new(repository.clone(), cache).with_metrics(metrics.clone()),
        );

        let processor = Arc::new(MessageProcessor::new(usecase.clone()));
        let retry_policy = RetryPolicy::new(
            config.kafka.retry_max_attempts,
            config.kafka.backoff_min,
            config.kafka.backoff_max,
        );
        let connector = Arc::new(KafkaConnector::new(config.kafka.broker.clone()));
        let consumer = Arc::new(
            StreamConsumer::new(
                connector,
                config.kafka.topics.clone(),
                processor,
                retry_policy,
            )
            .with_metrics(metrics.clone()),
        );
        let broker = Broker::new(consumer).with_metrics(metrics.clone());

        Ok(Self {
            config,
            metrics,
            repository,
            usecase,
            broker,
            servers: Vec::new(),
        })
    }

    /// Start serving. Returns once HTTP is listening and the broker loops
    /// are running; everything stops through `shutdown`.
    pub async fn run(&mut self, cancel: &CancellationToken) -> anyhow::Result<()> {
        // Warm-up must finish before the pipeline starts taking messages
        let loaded = self
            .usecase
            .load_orders_cache(self.config.cache.warmup)
            .await
            .context("failed to warm up orders cache")?;
        tracing::info!(loaded, "Cache warm-up complete");

        let http = &self.config.http;
        let api = http::api_server(self.usecase.clone(), &http.host, http.port)
            .context("failed to bind order API")?;
        let scrape = http::metrics_server(self.metrics.registry().clone(), &http.host, http.metrics_port)
            .context("failed to bind metrics server")?;

        for (name, server) in [("api", api), ("metrics", scrape)] {
            self.servers.push(server.handle());
            actix_web::rt::spawn(async move {
                if let Err(e) = server.await {
                    tracing::error!(server = name, error = %e, "HTTP server error");
                }
            });
        }

        self.broker
            .run(cancel)
            .await
            .context("failed to start broker")?;

        tracing::info!("🚀 Order service running");
        Ok(())
    }

    /// Stop HTTP, drain the broker and close the pool. Every step runs even
    /// if an earlier one fails; failures are reported together.
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        tracing::info!("Shutting down order service");
        let mut errors = Vec::new();

        for handle in self.servers.drain(..) {
            handle.stop(true).await;
        }

        if let Err(e) = self.broker.shutdown().await {
            errors.push(format!("broker: {e}"));
        }

        self.repository.close().await;
        tracing::info!("Database pool closed");

        if errors.is_empty() {
            tracing::info!("✅ Shutdown complete");
            Ok(())
        } else {
            anyhow::bail!("shutdown finished with errors: {}", errors.join("; "))
        }
    }
}
