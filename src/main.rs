//! Shell Cache - An offline-first app shell cache worker
//!
//! Serves an origin's app shell cache-first and keeps it fresh on request.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use shell_cache::api::{create_router, AppState};
use shell_cache::cache::CacheStore;
use shell_cache::config::Config;
use shell_cache::fetch::HttpFetcher;
use shell_cache::tasks::spawn_update_check_task;
use shell_cache::worker::{ClientRegistry, PrecacheManifest, ServiceWorker, WorkerContext};

/// Main entry point for the shell cache worker.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the cache store (on disk, or in memory)
/// 4. Install and activate this release's generation, falling back to the
///    previous generation if installation is rejected
/// 5. Start the background update check task
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shell_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting shell cache worker");

    let config = Config::from_env();
    info!(
        "Configuration loaded: origin={}, generation={}, assets={}, cache_dir={:?}, port={}",
        config.origin,
        config.generation_id(),
        config.precache_manifest.len(),
        config.cache_dir,
        config.server_port
    );

    let origin = Url::parse(&config.origin)
        .with_context(|| format!("invalid ORIGIN '{}'", config.origin))?;

    let store = match &config.cache_dir {
        Some(dir) => CacheStore::open_dir(dir.clone())
            .with_context(|| format!("failed to open cache directory {}", dir.display()))?,
        None => {
            warn!("No cache directory configured, cache lives in memory only");
            CacheStore::in_memory()
        }
    };

    let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch_timeout))
        .context("failed to build HTTP client")?;
    let ctx = WorkerContext::new(
        origin.clone(),
        store.shared(),
        Arc::new(fetcher),
        ClientRegistry::new(),
    );

    let manifest = PrecacheManifest::resolve(&origin, config.precache_manifest.as_slice())
        .context("invalid PRECACHE_MANIFEST")?;
    let worker = ServiceWorker::new(
        ctx.clone(),
        config.generation_id(),
        manifest,
        config.worker_options(),
    );

    let worker = match worker.start().await {
        Ok(state) => {
            info!("Worker '{}' is {}", worker.generation(), state);
            worker
        }
        Err(err) => {
            error!("Worker '{}' failed to start: {}", worker.generation(), err);
            ServiceWorker::resume(ctx, config.worker_options())
                .await
                .context("no previous generation to fall back to")?
        }
    };
    let worker = Arc::new(worker);

    let update_handle = spawn_update_check_task(worker.clone(), config.refresh_interval);

    let passthrough = config
        .passthrough_origins
        .iter()
        .map(|entry| {
            Url::parse(entry)
                .map(|url| url.origin())
                .with_context(|| format!("invalid PASSTHROUGH_ORIGINS entry '{}'", entry))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let state =
        AppState::new(worker, config.app_version.clone()).with_passthrough_origins(passthrough);
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(update_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the update check task and allows graceful shutdown.
async fn shutdown_signal(update_handle: Option<tokio::task::JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = update_handle {
        handle.abort();
        warn!("Update check task aborted");
    }
}
