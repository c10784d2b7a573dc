//! Worker Module
//!
//! The cache-worker context: owns the cache store, intercepts requests,
//! answers page messages and drives its own install/activate lifecycle.

pub mod clients;
pub mod intercept;
pub mod lifecycle;
pub mod messages;
pub mod precache;
pub mod refresh;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use url::Url;

use crate::cache::SharedStore;
use crate::error::{Result, WorkerError};
use crate::fetch::{FetchRequest, Fetcher};

// Re-export public types
pub use clients::{ClientId, ClientInfo, ClientRegistry, ConnectedClient};
pub use intercept::{Intercepted, RequestInterceptor, ResponseSource};
pub use lifecycle::{ActivationReport, LifecycleController, WorkerState};
pub use messages::{PageMessage, WorkerMessage};
pub use precache::{fetch_into, FailedAsset, PrecacheManifest, PrecacheReport};
pub use refresh::{RefreshHandler, RefreshOutcome, RefreshReport};

// == Worker Context ==
/// Everything a worker reaches: its origin, the cache store, the network and
/// the connected pages. Cheap to clone.
#[derive(Clone)]
pub struct WorkerContext {
    pub origin: Url,
    pub store: SharedStore,
    pub fetcher: Arc<dyn Fetcher>,
    pub clients: ClientRegistry,
}

impl WorkerContext {
    pub fn new(
        origin: Url,
        store: SharedStore,
        fetcher: Arc<dyn Fetcher>,
        clients: ClientRegistry,
    ) -> Self {
        Self {
            origin,
            store,
            fetcher,
            clients,
        }
    }

    /// True when `url` shares scheme, host and port with the worker's origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("origin", &self.origin.as_str())
            .finish_non_exhaustive()
    }
}

/// Runs `future` on its own task and waits for it.
///
/// The task keeps running to completion even if the caller is dropped.
pub async fn wait_until<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(future)
        .await
        .map_err(|e| WorkerError::Internal(format!("worker task failed: {}", e)))?
}

/// Worker behavior switches.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WorkerOptions {
    /// Strip the query string from cache keys
    pub ignore_query: bool,
    /// Activate right after install instead of waiting for pages to go away
    pub skip_waiting: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            ignore_query: true,
            skip_waiting: true,
        }
    }
}

/// Result of handling a page message.
#[derive(Debug, Clone)]
pub enum MessageOutcome {
    Refresh(RefreshOutcome),
    State(WorkerState),
}

// == Service Worker ==
/// One version of the worker bound to one cache generation.
#[derive(Debug)]
pub struct ServiceWorker {
    ctx: WorkerContext,
    options: WorkerOptions,
    manifest: PrecacheManifest,
    lifecycle: LifecycleController,
    interceptor: RequestInterceptor,
    refresh: RefreshHandler,
}

impl ServiceWorker {
    pub fn new(
        ctx: WorkerContext,
        generation: impl Into<String>,
        manifest: PrecacheManifest,
        options: WorkerOptions,
    ) -> Self {
        Self {
            interceptor: RequestInterceptor::new(options.ignore_query),
            lifecycle: LifecycleController::new(generation),
            refresh: RefreshHandler::new(),
            manifest,
            options,
            ctx,
        }
    }

    /// Rebuilds the active worker over the store's current generation and its
    /// stored manifest.
    pub async fn resume(ctx: WorkerContext, options: WorkerOptions) -> Result<Self> {
        let (generation, entries) = {
            let store = ctx.store.read().await;
            let generation = store
                .current()
                .ok_or_else(|| WorkerError::NotFound("no current generation to resume".into()))?
                .to_string();
            let entries = store.manifest(&generation).unwrap_or_default().to_vec();
            (generation, entries)
        };
        let manifest = PrecacheManifest::resolve(&ctx.origin, entries.as_slice())?;
        info!(
            "Resuming generation '{}' ({} manifest assets)",
            generation,
            manifest.len()
        );

        Ok(Self {
            interceptor: RequestInterceptor::new(options.ignore_query),
            lifecycle: LifecycleController::activated(generation),
            refresh: RefreshHandler::new(),
            manifest,
            options,
            ctx,
        })
    }

    /// Installs, then activates when allowed to.
    ///
    /// Activation is immediate with `skip_waiting` or when no page is
    /// connected. Otherwise the worker is left `Installed`.
    pub async fn start(&self) -> Result<WorkerState> {
        self.install().await?;

        if self.options.skip_waiting || self.ctx.clients.is_empty().await {
            self.activate().await?;
        } else {
            info!(
                "Worker '{}' installed and waiting for pages to close",
                self.generation()
            );
        }
        Ok(self.state().await)
    }

    pub async fn install(&self) -> Result<PrecacheReport> {
        self.lifecycle.install(&self.ctx, &self.manifest).await
    }

    pub async fn activate(&self) -> Result<ActivationReport> {
        self.lifecycle.activate(&self.ctx).await
    }

    /// Activates a waiting worker. Already-active workers are left alone.
    pub async fn skip_waiting(&self) -> Result<WorkerState> {
        match self.state().await {
            WorkerState::Installed => {
                self.activate().await?;
            }
            WorkerState::Activated => {}
            other => {
                return Err(WorkerError::State(format!(
                    "cannot skip waiting while {}",
                    other
                )))
            }
        }
        Ok(self.state().await)
    }

    /// Activates a waiting worker once no page is connected. Returns whether
    /// it activated.
    pub async fn activate_if_idle(&self) -> Result<bool> {
        if self.state().await != WorkerState::Installed || !self.ctx.clients.is_empty().await {
            return Ok(false);
        }
        self.activate().await?;
        Ok(true)
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.state().await
    }

    /// Answers an intercepted request.
    pub async fn handle_fetch(&self, request: FetchRequest) -> Result<Intercepted> {
        self.interceptor.handle(&self.ctx, request).await
    }

    /// Refreshes the current generation on its own task.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let handler = self.refresh.clone();
        let ctx = self.ctx.clone();
        wait_until(async move { handler.run(&ctx).await }).await
    }

    pub async fn handle_message(&self, message: PageMessage) -> Result<MessageOutcome> {
        match message {
            PageMessage::RefreshApp => self.refresh().await.map(MessageOutcome::Refresh),
            PageMessage::SkipWaiting => self.skip_waiting().await.map(MessageOutcome::State),
        }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn generation(&self) -> &str {
        self.lifecycle.generation()
    }

    pub fn manifest(&self) -> &PrecacheManifest {
        &self.manifest
    }

    pub fn options(&self) -> WorkerOptions {
        self.options
    }

    pub async fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing().await
    }
}
