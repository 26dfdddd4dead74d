//! `nodehookd` binary: load configuration, wire the engine and serve HTTP
//! until interrupted.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use nodehook_adapter_storage_sqlite_sqlx::Config as DatabaseConfig;
use nodehookd::Daemon;
use nodehookd::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.logging.filter)
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let db = DatabaseConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await
    .context("failed to open database")?;

    let daemon = Daemon::build(db.pool().clone(), config.engine.clone())
        .await
        .context("failed to start engine")?;
    let scheduler = daemon.spawn_scheduler();
    let app = daemon.router();

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, view = %daemon.default_view.id, "nodehookd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    scheduler.abort();
    daemon.shutdown();
    tracing::info!("nodehookd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
