//! Lifecycle Controller
//!
//! Install → waiting → activate, with old-generation eviction on activate.
//!
//! ```text
//! Parsed ─install─▶ Installing ─ok─▶ Installed ─activate─▶ Activating ─▶ Activated
//!                        │
//!                        └─rejected─▶ Redundant
//! ```

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::error::{Result, WorkerError};
use crate::worker::precache::{fetch_into, PrecacheManifest, PrecacheReport};
use crate::worker::WorkerContext;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Created, nothing done yet.
    #[default]
    Parsed,
    /// Precaching its generation.
    Installing,
    /// Installed and waiting to take over.
    Installed,
    /// Evicting old generations.
    Activating,
    /// Serving and controlling pages.
    Activated,
    /// Install rejected or superseded.
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// What activation changed.
#[derive(Debug, Clone, Serialize)]
pub struct ActivationReport {
    pub generation: String,
    /// Generations garbage-collected
    pub deleted: Vec<String>,
    /// Pages newly claimed
    pub claimed: usize,
}

// == Lifecycle Controller ==
/// Drives one worker version's generation through install and activate.
#[derive(Debug)]
pub struct LifecycleController {
    generation: String,
    state: RwLock<WorkerState>,
}

impl LifecycleController {
    pub fn new(generation: impl Into<String>) -> Self {
        Self {
            generation: generation.into(),
            state: RwLock::new(WorkerState::Parsed),
        }
    }

    /// Starts in `Activated`, for a worker resumed over an existing generation.
    pub fn activated(generation: impl Into<String>) -> Self {
        Self {
            generation: generation.into(),
            state: RwLock::new(WorkerState::Activated),
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        let mut current = self.state.write().await;
        if *current != state {
            info!("Worker '{}': {} -> {}", self.generation, *current, state);
            *current = state;
        }
    }

    // == Install ==
    /// Creates the generation and precaches the manifest into it.
    ///
    /// Rejected when storage cannot be opened or when a non-empty manifest
    /// stores nothing. A rejected install deletes its generation unless that
    /// generation is already current, and leaves the worker `Redundant`.
    pub async fn install(
        &self,
        ctx: &WorkerContext,
        manifest: &PrecacheManifest,
    ) -> Result<PrecacheReport> {
        {
            let state = self.state().await;
            if state != WorkerState::Parsed {
                return Err(WorkerError::State(format!(
                    "cannot install a worker that is {}",
                    state
                )));
            }
        }
        self.set_state(WorkerState::Installing).await;

        let created = ctx
            .store
            .write()
            .await
            .create(&self.generation, manifest.to_strings());
        if let Err(err) = created {
            self.reject(ctx).await;
            return Err(WorkerError::InstallFailed(format!(
                "cache storage unavailable for '{}': {}",
                self.generation, err
            )));
        }

        let report = fetch_into(ctx, &self.generation, manifest).await;

        if !manifest.is_empty() && report.stored.is_empty() {
            self.reject(ctx).await;
            return Err(WorkerError::InstallFailed(format!(
                "none of the {} manifest assets could be cached for '{}'",
                manifest.len(),
                self.generation
            )));
        }

        self.set_state(WorkerState::Installed).await;
        Ok(report)
    }

    async fn reject(&self, ctx: &WorkerContext) {
        let mut store = ctx.store.write().await;
        if store.current() != Some(self.generation.as_str()) {
            if let Err(err) = store.delete(&self.generation) {
                error!(
                    "Failed to discard rejected generation '{}': {}",
                    self.generation, err
                );
            }
        }
        drop(store);

        error!(
            "Install of '{}' rejected; previous generation stays current",
            self.generation
        );
        self.set_state(WorkerState::Redundant).await;
    }

    // == Activate ==
    /// Deletes every other generation, makes this one current and claims all pages.
    pub async fn activate(&self, ctx: &WorkerContext) -> Result<ActivationReport> {
        match self.state().await {
            WorkerState::Installed => {}
            WorkerState::Activated => {
                return Ok(ActivationReport {
                    generation: self.generation.clone(),
                    deleted: Vec::new(),
                    claimed: 0,
                })
            }
            other => {
                return Err(WorkerError::State(format!(
                    "cannot activate a worker that is {}",
                    other
                )))
            }
        }
        self.set_state(WorkerState::Activating).await;

        let deleted = {
            let mut store = ctx.store.write().await;
            let stale: Vec<String> = store
                .list_generations()
                .into_iter()
                .filter(|id| *id != self.generation)
                .collect();
            for id in &stale {
                if let Err(err) = store.delete(id) {
                    drop(store);
                    self.set_state(WorkerState::Installed).await;
                    return Err(err);
                }
            }
            if let Err(err) = store.set_current(&self.generation) {
                drop(store);
                self.set_state(WorkerState::Installed).await;
                return Err(err);
            }
            stale
        };

        let claimed = ctx.clients.claim().await;
        self.set_state(WorkerState::Activated).await;

        info!(
            "Activated '{}' (deleted {} old generations, claimed {} pages)",
            self.generation,
            deleted.len(),
            claimed
        );
        Ok(ActivationReport {
            generation: self.generation.clone(),
            deleted,
            claimed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, CachedResponse, RequestKey};
    use crate::fetch::MemoryFetcher;
    use crate::worker::ClientRegistry;
    use std::sync::Arc;
    use url::Url;

    fn origin() -> Url {
        Url::parse("https://app.example/").unwrap()
    }

    fn context(fetcher: Arc<MemoryFetcher>) -> WorkerContext {
        WorkerContext::new(
            origin(),
            CacheStore::in_memory().shared(),
            fetcher,
            ClientRegistry::new(),
        )
    }

    fn key(path: &str) -> RequestKey {
        RequestKey::parse_get(&format!("https://app.example{}", path)).unwrap()
    }

    #[tokio::test]
    async fn test_install_then_activate() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.route_ok("https://app.example/", "<html>");
        let ctx = context(fetcher);
        let manifest = PrecacheManifest::resolve(&origin(), &["/"]).unwrap();
        let lifecycle = LifecycleController::new("shell-v1");

        let report = lifecycle.install(&ctx, &manifest).await.unwrap();
        assert_eq!(report.stored.len(), 1);
        assert_eq!(lifecycle.state().await, WorkerState::Installed);
        assert!(ctx.store.read().await.current().is_none());

        lifecycle.activate(&ctx).await.unwrap();
        assert_eq!(lifecycle.state().await, WorkerState::Activated);
        assert_eq!(ctx.store.read().await.current(), Some("shell-v1"));
    }

    #[tokio::test]
    async fn test_install_twice_is_rejected() {
        let ctx = context(Arc::new(MemoryFetcher::new()));
        let lifecycle = LifecycleController::new("shell-v1");
        let manifest = PrecacheManifest::default();

        lifecycle.install(&ctx, &manifest).await.unwrap();
        assert!(matches!(
            lifecycle.install(&ctx, &manifest).await,
            Err(WorkerError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_activate_before_install_is_rejected() {
        let ctx = context(Arc::new(MemoryFetcher::new()));
        let lifecycle = LifecycleController::new("shell-v1");

        assert!(matches!(
            lifecycle.activate(&ctx).await,
            Err(WorkerError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_total_precache_failure_rejects_install() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.fail("https://app.example/a.js");
        fetcher.fail("https://app.example/b.js");
        let ctx = context(fetcher);
        let manifest = PrecacheManifest::resolve(&origin(), &["/a.js", "/b.js"]).unwrap();
        let lifecycle = LifecycleController::new("shell-v2");

        let result = lifecycle.install(&ctx, &manifest).await;

        assert!(matches!(result, Err(WorkerError::InstallFailed(_))));
        assert_eq!(lifecycle.state().await, WorkerState::Redundant);
        assert!(!ctx.store.read().await.contains("shell-v2"));
    }

    #[tokio::test]
    async fn test_rejected_reinstall_keeps_current_generation() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.fail("https://app.example/a.js");
        let ctx = context(fetcher);
        {
            let mut store = ctx.store.write().await;
            store.create("shell-v1", Vec::new()).unwrap();
            store.put("shell-v1", key("/a.js"), CachedResponse::ok("a")).unwrap();
            store.set_current("shell-v1").unwrap();
        }
        let manifest = PrecacheManifest::resolve(&origin(), &["/a.js"]).unwrap();
        let lifecycle = LifecycleController::new("shell-v1");

        assert!(lifecycle.install(&ctx, &manifest).await.is_err());

        let store = ctx.store.read().await;
        assert_eq!(store.current(), Some("shell-v1"));
        assert!(store.peek("shell-v1", &key("/a.js")).is_some());
    }

    #[tokio::test]
    async fn test_activate_claims_connected_pages() {
        let ctx = context(Arc::new(MemoryFetcher::new()));
        let _page = ctx.clients.connect(None).await;
        let lifecycle = LifecycleController::new("shell-v1");

        lifecycle.install(&ctx, &PrecacheManifest::default()).await.unwrap();
        let report = lifecycle.activate(&ctx).await.unwrap();

        assert_eq!(report.claimed, 1);
        assert!(ctx.clients.list().await.iter().all(|c| c.controlled));
    }
}
