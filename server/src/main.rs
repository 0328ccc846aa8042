//! Coupon Rush server.
//!
//! This binary:
//! - Connects to `PostgreSQL` (with migrations) and Redis
//! - Seeds every fast-path counter from the durable inventory
//! - Starts the issuance worker and the reconciliation scheduler
//! - Serves the HTTP API and the Prometheus scrape endpoint
//!
//! # Usage
//!
//! ```bash
//! DATABASE_URL=postgres://... REDIS_URL=redis://... cargo run -p coupon-rush-server
//! ```

mod config;
mod probes;

use anyhow::Context;
use axum::{Router, routing::get};
use config::Config;
use coupon_rush_core::environment::SystemClock;
use coupon_rush_postgres::{
    DeadLetterQueue, PostgresInventoryStore, PostgresIssuanceRepository, migrate,
};
use coupon_rush_redis::{RedisClaimRegistry, RedisIssuanceQueue, RedisSlotCounter};
use coupon_rush_runtime::{
    HealthProbe, IssuanceAdmin, IssuanceWorker, MetricsServer, Providers, ReconciliationJob,
    RetryPolicy, SlotAllocator, retry_with_backoff,
};
use coupon_rush_web::{AppState, router};
use probes::{PostgresProbe, RedisProbe};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coupon_rush=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        redis = %config.redis.url,
        async_enabled = config.issuance.async_enabled,
        "Configuration loaded"
    );

    let metrics_addr: SocketAddr = format!("{}:{}", config.server.metrics_host, config.server.metrics_port)
        .parse()
        .context("invalid metrics address")?;
    let mut metrics = MetricsServer::new(metrics_addr);
    metrics.start().context("failed to install metrics recorder")?;
    let metrics = Arc::new(metrics);

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .connect(&config.postgres.url)
        .await
        .context("failed to connect to PostgreSQL")?;
    migrate(&pool).await.context("failed to run migrations")?;

    info!("Connecting to Redis...");
    let redis = coupon_rush_redis::connect(&config.redis.url)
        .await
        .context("failed to connect to Redis")?;

    let providers = Providers {
        inventory: Arc::new(PostgresInventoryStore::new(pool.clone())),
        counter: Arc::new(RedisSlotCounter::new(redis.clone())),
        queue: Arc::new(RedisIssuanceQueue::new(redis.clone())),
        issuances: Arc::new(PostgresIssuanceRepository::new(pool.clone())),
        claims: Arc::new(RedisClaimRegistry::new(redis.clone())),
        dead_letters: Arc::new(DeadLetterQueue::new(pool.clone())),
        clock: Arc::new(SystemClock::with_offset(config.business_offset())),
    };

    let reconciliation = Arc::new(ReconciliationJob::new(
        providers.clone(),
        config.reconciliation(),
    ));

    // Redis may still be coming up; the allocator falls back meanwhile.
    let startup = RetryPolicy::builder()
        .max_attempts(10)
        .initial_delay(Duration::from_millis(500))
        .max_delay(Duration::from_secs(5))
        .build();
    match retry_with_backoff(&startup, || reconciliation.initialize_all_counters()).await {
        Ok(seeded) => info!(seeded, "Fast-path counters initialized"),
        Err(e) => warn!(error = %e, "Counter seeding failed, periodic resync will retry"),
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let worker = Arc::new(IssuanceWorker::new(providers.clone(), config.worker()));
    let handles = vec![
        Arc::clone(&worker).spawn(shutdown_tx.subscribe()),
        Arc::clone(&reconciliation).spawn(shutdown_tx.subscribe()),
        spawn_metrics_endpoint(metrics, shutdown_tx.subscribe()),
    ];

    let probes: Vec<Arc<dyn HealthProbe>> = vec![
        Arc::new(PostgresProbe::new(pool.clone())),
        Arc::new(RedisProbe::new(redis)),
    ];
    let state = AppState::new(
        Arc::new(SlotAllocator::new(providers.clone(), config.allocator())),
        reconciliation,
        IssuanceAdmin::new(
            Arc::clone(&providers.queue),
            Arc::clone(&providers.dead_letters),
            config.queue_settings(),
        ),
        probes,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped, stopping background tasks");
    let _ = shutdown_tx.send(());
    await_shutdown(handles, Duration::from_secs(config.server.shutdown_timeout)).await;

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Serve `GET /metrics` until shutdown.
fn spawn_metrics_endpoint(
    metrics: Arc<MetricsServer>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let addr = metrics.addr();
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move { metrics.render().unwrap_or_default() }
            }),
        );

        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(%addr, error = %e, "Failed to bind metrics endpoint");
                return;
            }
        };
        info!(%addr, "Metrics endpoint listening");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "Metrics endpoint failed");
        }
    })
}

/// Wait for background tasks, giving each `timeout` to finish its current work.
async fn await_shutdown(handles: Vec<JoinHandle<()>>, timeout: Duration) {
    for (idx, handle) in handles.into_iter().enumerate() {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => info!(task = idx, "Background task stopped"),
            Ok(Err(e)) => warn!(task = idx, error = %e, "Background task failed"),
            Err(_) => warn!(task = idx, "Background task shutdown timed out"),
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
