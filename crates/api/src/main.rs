use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use guestbook_api::{app, config, middleware};

const POOL_METRICS_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::Config::load()?;
    middleware::logging::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting guestbook API v{}", env!("CARGO_PKG_VERSION"));

    let db_config = persistence::db::DatabaseConfig::from(&config.database);
    let pool = persistence::db::create_pool(&db_config).await?;

    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;
    info!("Migrations completed");

    let shutdown = CancellationToken::new();
    let addr = config.socket_addr()?;
    let (state, repository) = app::AppState::new(config, pool.clone());

    let listener_task = repository.spawn_change_listener(shutdown.child_token());
    let pool_metrics_task = tokio::spawn(sample_pool_metrics(pool, shutdown.child_token()));

    let router = app::router(state);
    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    for task in [listener_task, pool_metrics_task] {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }
    info!("Server stopped");
    Ok(())
}

async fn sample_pool_metrics(pool: sqlx::PgPool, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(POOL_METRICS_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => persistence::metrics::record_pool_metrics(&pool),
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        // Keep serving until cancelled some other way.
        shutdown.cancelled().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
