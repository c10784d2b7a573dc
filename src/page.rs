//! Page Context
//!
//! The page side of the worker protocol: one connected page that can ask for
//! a refresh, wait for `REFRESH_APP_DONE`, and nudge a waiting worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, WorkerError};
use crate::worker::{
    ClientId, ConnectedClient, MessageOutcome, PageMessage, RefreshOutcome, ServiceWorker,
    WorkerMessage, WorkerState,
};

/// Minimum time between two update checks from one page.
pub const UPDATE_CHECK_THROTTLE: Duration = Duration::from_secs(20);

/// A page connected to a worker.
#[derive(Debug)]
pub struct PageContext {
    worker: Arc<ServiceWorker>,
    client: Option<ConnectedClient>,
    last_update_check: Option<Instant>,
}

impl PageContext {
    /// Connects a page. It is controlled from the start when the worker is
    /// already active.
    pub async fn connect(worker: Arc<ServiceWorker>, url: Option<String>) -> Self {
        let clients = &worker.context().clients;
        let client = if worker.state().await == WorkerState::Activated {
            clients.connect_controlled(url).await
        } else {
            clients.connect(url).await
        };
        debug!("Page context {} ready", client.id);

        Self {
            worker,
            client: Some(client),
            last_update_check: None,
        }
    }

    pub fn id(&self) -> Option<ClientId> {
        self.client.as_ref().map(|c| c.id)
    }

    /// Leaves the worker. Returns whether the page was connected.
    pub async fn disconnect(&mut self) -> bool {
        match self.client.take() {
            Some(client) => self.worker.context().clients.disconnect(client.id).await,
            None => false,
        }
    }

    /// Returns a worker message if one is already queued.
    pub fn try_next_message(&mut self) -> Option<WorkerMessage> {
        self.client.as_mut().and_then(ConnectedClient::try_recv)
    }

    /// Sends `REFRESH_APP` and waits for `REFRESH_APP_DONE`.
    ///
    /// Messages queued before the request are discarded first, so only the
    /// DONE of this request's refresh (its own, or the one it joined) is
    /// accepted. When that refresh aborts nothing is broadcast and the error
    /// is returned.
    pub async fn request_refresh(&mut self) -> Result<RefreshOutcome> {
        let stale = self.drain_messages()?;
        if stale > 0 {
            debug!("Discarded {} stale worker messages", stale);
        }

        let outcome = match self.worker.handle_message(PageMessage::RefreshApp).await? {
            MessageOutcome::Refresh(outcome) => outcome,
            MessageOutcome::State(state) => {
                return Err(WorkerError::Internal(format!(
                    "unexpected reply to REFRESH_APP: {}",
                    state
                )))
            }
        };

        self.take_done()?;
        info!("Page {:?} saw REFRESH_APP_DONE, reloading", self.id());
        Ok(outcome)
    }

    fn connected(&mut self) -> Result<&mut ConnectedClient> {
        self.client
            .as_mut()
            .ok_or_else(|| WorkerError::State("page is not connected".into()))
    }

    fn drain_messages(&mut self) -> Result<usize> {
        let client = self.connected()?;
        let mut drained = 0;
        while client.try_recv().is_some() {
            drained += 1;
        }
        Ok(drained)
    }

    // The refresh publishes its result only after broadcasting, so DONE is
    // already queued once the outcome is in hand.
    fn take_done(&mut self) -> Result<()> {
        match self.connected()?.try_recv() {
            Some(WorkerMessage::RefreshAppDone) => Ok(()),
            None => Err(WorkerError::Internal(
                "refresh finished without REFRESH_APP_DONE for this page".into(),
            )),
        }
    }

    /// Requests a refresh unless this page already did so within
    /// [`UPDATE_CHECK_THROTTLE`]. Returns whether a refresh ran.
    pub async fn check_for_updates(&mut self) -> Result<bool> {
        let now = Instant::now();
        if let Some(last) = self.last_update_check {
            if now.duration_since(last) < UPDATE_CHECK_THROTTLE {
                debug!("Update check throttled");
                return Ok(false);
            }
        }
        self.last_update_check = Some(now);

        info!("Triggering worker update check");
        self.request_refresh().await?;
        Ok(true)
    }

    /// Sends `SKIP_WAITING`.
    pub async fn skip_waiting(&self) -> Result<WorkerState> {
        match self.worker.handle_message(PageMessage::SkipWaiting).await? {
            MessageOutcome::State(state) => Ok(state),
            MessageOutcome::Refresh(_) => Err(WorkerError::Internal(
                "unexpected reply to SKIP_WAITING".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::fetch::MemoryFetcher;
    use crate::worker::{ClientRegistry, PrecacheManifest, WorkerContext, WorkerOptions};
    use tokio_test::{assert_err, assert_ok};
    use url::Url;

    async fn started_worker(options: WorkerOptions) -> Arc<ServiceWorker> {
        let origin = Url::parse("https://app.example/").unwrap();
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.route_ok("https://app.example/", "<html>");
        let ctx = WorkerContext::new(
            origin.clone(),
            CacheStore::in_memory().shared(),
            fetcher,
            ClientRegistry::new(),
        );
        let manifest = PrecacheManifest::resolve(&origin, &["/"]).unwrap();
        let worker = Arc::new(ServiceWorker::new(ctx, "shell-v1", manifest, options));
        worker.start().await.unwrap();
        worker
    }

    #[tokio::test]
    async fn test_page_is_controlled_by_active_worker() {
        let worker = started_worker(WorkerOptions::default()).await;
        let page = PageContext::connect(worker.clone(), Some("https://app.example/#/".into())).await;

        let clients = worker.context().clients.list().await;
        assert_eq!(clients.len(), 1);
        assert_eq!(Some(clients[0].id), page.id());
        assert!(clients[0].controlled);
    }

    #[tokio::test]
    async fn test_request_refresh_waits_for_done() {
        let worker = started_worker(WorkerOptions::default()).await;
        let mut page = PageContext::connect(worker, None).await;

        let outcome = assert_ok!(page.request_refresh().await);

        assert!(matches!(outcome, RefreshOutcome::Completed(ref r) if r.notified == 1));
        assert_eq!(page.try_next_message(), None);
    }

    #[tokio::test]
    async fn test_other_pages_are_notified_too() {
        let worker = started_worker(WorkerOptions::default()).await;
        let mut requester = PageContext::connect(worker.clone(), None).await;
        let mut other = PageContext::connect(worker, None).await;

        assert_ok!(requester.request_refresh().await);

        assert_eq!(other.try_next_message(), Some(WorkerMessage::RefreshAppDone));
    }

    #[tokio::test]
    async fn test_stale_done_does_not_answer_a_new_request() {
        let worker = started_worker(WorkerOptions::default()).await;
        let mut page = PageContext::connect(worker.clone(), None).await;
        worker
            .context()
            .clients
            .broadcast(WorkerMessage::RefreshAppDone)
            .await;
        worker.context().store.write().await.delete("shell-v1").unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), page.request_refresh())
            .await
            .expect("aborted refresh must not leave the page waiting");

        assert!(matches!(result, Err(WorkerError::Storage(_))));
        assert_eq!(page.try_next_message(), None);
    }

    #[tokio::test]
    async fn test_disconnected_page_cannot_refresh() {
        let worker = started_worker(WorkerOptions::default()).await;
        let mut page = PageContext::connect(worker.clone(), None).await;

        assert!(page.disconnect().await);
        assert!(!page.disconnect().await);
        assert_err!(page.request_refresh().await);
        assert!(worker.context().clients.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_checks_are_throttled() {
        let worker = started_worker(WorkerOptions::default()).await;
        let mut page = PageContext::connect(worker, None).await;

        assert!(assert_ok!(page.check_for_updates().await));
        assert!(!assert_ok!(page.check_for_updates().await));

        tokio::time::advance(UPDATE_CHECK_THROTTLE).await;
        assert!(assert_ok!(page.check_for_updates().await));
    }

    #[tokio::test]
    async fn test_skip_waiting_from_page() {
        let options = WorkerOptions {
            skip_waiting: false,
            ..WorkerOptions::default()
        };
        let origin = Url::parse("https://app.example/").unwrap();
        let ctx = WorkerContext::new(
            origin,
            CacheStore::in_memory().shared(),
            Arc::new(MemoryFetcher::new()),
            ClientRegistry::new(),
        );
        let worker = Arc::new(ServiceWorker::new(
            ctx,
            "shell-v2",
            PrecacheManifest::default(),
            options,
        ));
        let page = PageContext::connect(worker.clone(), None).await;
        assert_eq!(worker.start().await.unwrap(), WorkerState::Installed);

        assert_eq!(page.skip_waiting().await.unwrap(), WorkerState::Activated);
    }
}
