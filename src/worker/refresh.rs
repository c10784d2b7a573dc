//! Refresh Protocol Handler
//!
//! Re-fetches every manifest asset into the current generation in place, then
//! tells every connected page with a single `REFRESH_APP_DONE`.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{error, info};

use crate::error::{Result, WorkerError};
use crate::worker::precache::{fetch_into, PrecacheManifest};
use crate::worker::{WorkerContext, WorkerMessage};

/// Result of one run, published to every request that joined it.
type RunResult = Option<Result<RefreshReport>>;

#[derive(Debug, Clone, Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing(watch::Receiver<RunResult>),
}

/// Summary of a completed refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub generation: String,
    pub refreshed: usize,
    pub failed: usize,
    /// Pages that received `REFRESH_APP_DONE`
    pub notified: usize,
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// This request ran the refresh.
    Completed(RefreshReport),
    /// A refresh was already running; this request waited for it and shares
    /// its report and its `REFRESH_APP_DONE`.
    Coalesced(RefreshReport),
}

impl RefreshOutcome {
    pub fn report(&self) -> &RefreshReport {
        match self {
            RefreshOutcome::Completed(report) | RefreshOutcome::Coalesced(report) => report,
        }
    }
}

// == Refresh Handler ==
/// Idle/Refreshing state machine shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct RefreshHandler {
    state: Arc<Mutex<RefreshState>>,
}

impl RefreshHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock().await, RefreshState::Refreshing(_))
    }

    /// Runs one refresh, or waits for the one already running.
    ///
    /// Per-asset failures are logged and still end in a broadcast. If the
    /// current generation cannot be opened the refresh aborts with an error
    /// and nothing is broadcast; requests that joined it get the same error.
    pub async fn run(&self, ctx: &WorkerContext) -> Result<RefreshOutcome> {
        let done = {
            let mut state = self.state.lock().await;
            // A closed channel means the running task was dropped before publishing.
            let running = match &*state {
                RefreshState::Refreshing(rx) if rx.has_changed().is_ok() => Some(rx.clone()),
                _ => None,
            };
            if let Some(rx) = running {
                drop(state);
                info!("Refresh already running, coalescing request");
                return Self::join(rx).await.map(RefreshOutcome::Coalesced);
            }
            let (tx, rx) = watch::channel(None);
            *state = RefreshState::Refreshing(rx);
            tx
        };

        let (generation, manifest) = match Self::open_current(ctx).await {
            Ok(target) => target,
            Err(err) => {
                error!("Refresh aborted: {}", err);
                let mut state = self.state.lock().await;
                *state = RefreshState::Idle;
                done.send_replace(Some(Err(err.clone())));
                return Err(err);
            }
        };

        info!(
            "Refreshing {} assets in '{}'",
            manifest.len(),
            generation
        );
        let fetched = fetch_into(ctx, &generation, &manifest).await;

        // Broadcast before going Idle: every joined request is answered by this DONE.
        let mut state = self.state.lock().await;
        let notified = ctx.clients.broadcast(WorkerMessage::RefreshAppDone).await;
        let report = RefreshReport {
            generation,
            refreshed: fetched.stored.len(),
            failed: fetched.failed.len(),
            notified,
        };
        *state = RefreshState::Idle;
        done.send_replace(Some(Ok(report.clone())));
        drop(state);

        info!(
            "Refresh of '{}' done: {} refreshed, {} failed, {} pages notified",
            report.generation, report.refreshed, report.failed, report.notified
        );
        Ok(RefreshOutcome::Completed(report))
    }

    async fn join(mut rx: watch::Receiver<RunResult>) -> Result<RefreshReport> {
        let published = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| WorkerError::Internal("refresh ended without a result".into()))?;
        match &*published {
            Some(result) => result.clone(),
            None => Err(WorkerError::Internal("refresh ended without a result".into())),
        }
    }

    async fn open_current(ctx: &WorkerContext) -> Result<(String, PrecacheManifest)> {
        let store = ctx.store.read().await;
        let generation = store
            .current()
            .ok_or_else(|| WorkerError::Storage("no current generation".into()))?
            .to_string();
        let opened = store.open(&generation)?;
        let manifest = PrecacheManifest::resolve(&ctx.origin, opened.manifest.as_slice())?;
        Ok((generation, manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, CachedResponse, RequestKey};
    use crate::fetch::MemoryFetcher;
    use crate::worker::ClientRegistry;
    use url::Url;

    const ORIGIN: &str = "https://app.example/";

    async fn setup(manifest: &[&str]) -> (WorkerContext, Arc<MemoryFetcher>) {
        let fetcher = Arc::new(MemoryFetcher::new());
        let ctx = WorkerContext::new(
            Url::parse(ORIGIN).unwrap(),
            CacheStore::in_memory().shared(),
            fetcher.clone(),
            ClientRegistry::new(),
        );
        {
            let mut store = ctx.store.write().await;
            let entries = manifest
                .iter()
                .map(|path| format!("https://app.example{}", path))
                .collect();
            store.create("shell-v1", entries).unwrap();
            store.set_current("shell-v1").unwrap();
        }
        (ctx, fetcher)
    }

    fn key(path: &str) -> RequestKey {
        RequestKey::parse_get(&format!("https://app.example{}", path)).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_updates_current_generation_in_place() {
        let (ctx, fetcher) = setup(&["/", "/app.js"]).await;
        fetcher.route_ok("https://app.example/", "<html>new");
        fetcher.route_ok("https://app.example/app.js", "new");
        ctx.store
            .write()
            .await
            .put("shell-v1", key("/app.js"), CachedResponse::ok("old"))
            .unwrap();

        let outcome = RefreshHandler::new().run(&ctx).await.unwrap();

        let RefreshOutcome::Completed(report) = outcome else {
            panic!("expected a completed refresh");
        };
        assert_eq!(report.generation, "shell-v1");
        assert_eq!(report.refreshed, 2);
        assert_eq!(report.failed, 0);

        let store = ctx.store.read().await;
        assert_eq!(store.list_generations(), vec!["shell-v1".to_string()]);
        assert_eq!(store.peek("shell-v1", &key("/app.js")).unwrap().response.body, b"new");
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let (ctx, fetcher) = setup(&["/app.js"]).await;
        fetcher.route_ok("https://app.example/app.js", "same");
        let handler = RefreshHandler::new();

        handler.run(&ctx).await.unwrap();
        let first = ctx.store.read().await.keys("shell-v1");
        handler.run(&ctx).await.unwrap();
        let second = ctx.store.read().await.keys("shell-v1");

        assert_eq!(first, second);
        assert_eq!(
            ctx.store.read().await.peek("shell-v1", &key("/app.js")).unwrap().response,
            CachedResponse::ok("same")
        );
    }

    #[tokio::test]
    async fn test_done_reaches_every_page_once() {
        let (ctx, fetcher) = setup(&["/app.js"]).await;
        fetcher.route_ok("https://app.example/app.js", "a");
        let mut controlled = ctx.clients.connect_controlled(None).await;
        let mut uncontrolled = ctx.clients.connect(None).await;

        let outcome = RefreshHandler::new().run(&ctx).await.unwrap();

        assert!(matches!(outcome, RefreshOutcome::Completed(ref r) if r.notified == 2));
        for page in [&mut controlled, &mut uncontrolled] {
            assert_eq!(page.try_recv(), Some(WorkerMessage::RefreshAppDone));
            assert_eq!(page.try_recv(), None);
        }
    }

    #[tokio::test]
    async fn test_partial_failure_still_broadcasts() {
        let (ctx, fetcher) = setup(&["/a.js", "/b.js"]).await;
        fetcher.route_ok("https://app.example/a.js", "a");
        fetcher.fail("https://app.example/b.js");
        let mut page = ctx.clients.connect(None).await;

        let outcome = RefreshHandler::new().run(&ctx).await.unwrap();

        assert!(matches!(outcome, RefreshOutcome::Completed(ref r) if r.failed == 1));
        assert_eq!(page.try_recv(), Some(WorkerMessage::RefreshAppDone));
    }

    #[tokio::test]
    async fn test_missing_generation_aborts_without_broadcast() {
        let (ctx, _fetcher) = setup(&["/a.js"]).await;
        ctx.store.write().await.delete("shell-v1").unwrap();
        let mut page = ctx.clients.connect(None).await;
        let handler = RefreshHandler::new();

        assert!(matches!(
            handler.run(&ctx).await,
            Err(WorkerError::Storage(_))
        ));
        assert_eq!(page.try_recv(), None);
        assert!(!handler.is_refreshing().await);
    }

    async fn spawn_run(
        handler: &RefreshHandler,
        ctx: &WorkerContext,
    ) -> tokio::task::JoinHandle<Result<RefreshOutcome>> {
        let handler = handler.clone();
        let ctx = ctx.clone();
        let task = tokio::spawn(async move { handler.run(&ctx).await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        task
    }

    #[tokio::test]
    async fn test_overlapping_requests_are_coalesced() {
        let (ctx, fetcher) = setup(&["/a.js"]).await;
        fetcher.route_ok("https://app.example/a.js", "a");
        let mut page = ctx.clients.connect(None).await;
        let handler = RefreshHandler::new();

        // Hold the store so the first run blocks before fetching.
        let guard = ctx.store.write().await;
        let first = spawn_run(&handler, &ctx).await;
        assert!(handler.is_refreshing().await);
        let second = spawn_run(&handler, &ctx).await;
        assert!(!second.is_finished());

        drop(guard);
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert!(matches!(first, RefreshOutcome::Completed(_)));
        assert!(matches!(second, RefreshOutcome::Coalesced(ref r) if r.refreshed == 1));
        assert_eq!(first.report().notified, second.report().notified);

        assert_eq!(page.try_recv(), Some(WorkerMessage::RefreshAppDone));
        assert_eq!(page.try_recv(), None);
    }

    #[tokio::test]
    async fn test_coalesced_request_sees_aborted_refresh() {
        let (ctx, _fetcher) = setup(&["/a.js"]).await;
        let mut page = ctx.clients.connect(None).await;
        let handler = RefreshHandler::new();

        let mut guard = ctx.store.write().await;
        let first = spawn_run(&handler, &ctx).await;
        let second = spawn_run(&handler, &ctx).await;
        guard.delete("shell-v1").unwrap();
        drop(guard);

        let first = first.await.unwrap();
        let second = tokio::time::timeout(std::time::Duration::from_secs(2), second)
            .await
            .expect("coalesced request must not hang")
            .unwrap();
        assert!(matches!(first, Err(WorkerError::Storage(_))));
        assert!(matches!(second, Err(WorkerError::Storage(_))));
        assert_eq!(page.try_recv(), None);
        assert!(!handler.is_refreshing().await);
    }
}
