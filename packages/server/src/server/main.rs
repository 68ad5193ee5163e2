// Main entry point for the watcher service

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use feed_watcher::storage::Storage;
use feed_watcher::{RendererSession, SqliteStorage};
use server_core::kernel::{DiscordNotifier, Scheduler};
use server_core::server::{build_app, AppState};
use server_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,feed_watcher=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting fanding feed watcher");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Open database
    if let Some(parent) = Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }
    let sqlite = Arc::new(
        SqliteStorage::connect(&config.database_path)
            .await
            .context("Failed to open database")?,
    );
    sqlite
        .migrate()
        .await
        .context("Failed to run migrations")?;
    tracing::info!(path = %config.database_path, "Database ready");

    let storage: Arc<dyn Storage> = sqlite.clone();
    let notifier = Arc::new(DiscordNotifier::new());

    if let Some(webhook) = &config.default_webhook_url {
        let is_new_route = storage
            .get_route("default")
            .await
            .context("Failed to look up default route")?
            .is_none();
        storage
            .set_route("default", webhook)
            .await
            .context("Failed to seed default route")?;

        // Ping freshly wired routes so a bad webhook shows up in the logs
        // right away instead of on the first real post.
        if is_new_route {
            if let Err(e) = notifier.send_test_message(webhook).await {
                tracing::warn!(error = ?e, "Default route test message failed");
            } else {
                tracing::info!("Default notification route seeded and verified");
            }
        }
    }

    // Renderer start failure is not fatal: the first cycle degrades to zero
    // candidates and the next one retries the full start sequence.
    let renderer = Arc::new(RendererSession::new(config.renderer.clone()));
    if let Err(e) = renderer.start().await {
        tracing::warn!(error = %e, "Renderer failed to start, will retry on next cycle");
    }
    let scheduler = Scheduler::new(
        storage.clone(),
        renderer,
        notifier,
        config.scheduler.clone(),
    );
    scheduler
        .clone()
        .start()
        .await
        .context("Failed to start scheduler")?;

    // Build application
    let state = AppState {
        storage: storage.clone(),
        scheduler: scheduler.clone(),
        started_at: Instant::now(),
    };
    let app = build_app(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Posts API: http://localhost:{}/api/posts", config.port);
    tracing::info!("Status: http://localhost:{}/api/status", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    // SIGINT/SIGTERM both land here; release everything in dependency
    // order: timers and renderer first, then the pool.
    scheduler.cleanup().await;
    sqlite.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
