//! In-memory fetcher serving canned responses.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cache::CachedResponse;
use crate::error::{Result, WorkerError};
use crate::fetch::{FetchRequest, Fetcher};

/// Serves responses from a URL map and counts every call.
///
/// Unknown URLs answer `404`; URLs marked with [`MemoryFetcher::fail`] return
/// a network error.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    routes: Mutex<HashMap<String, CachedResponse>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    total: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `response` for `url`.
    pub fn route(&self, url: &str, response: CachedResponse) {
        lock(&self.routes).insert(url.to_string(), response);
    }

    /// Serves a `200` with `body` for `url`.
    pub fn route_ok(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.route(url, CachedResponse::ok(body));
    }

    /// Makes fetches of `url` fail with a network error.
    pub fn fail(&self, url: &str) {
        lock(&self.failing).insert(url.to_string());
    }

    /// Lets fetches of `url` succeed again.
    pub fn recover(&self, url: &str) {
        lock(&self.failing).remove(url);
    }

    /// Total number of fetches attempted.
    pub fn call_count(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Number of fetches attempted for `url`.
    pub fn calls_to(&self, url: &str) -> usize {
        lock(&self.calls).iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse> {
        let url = request.url.to_string();
        self.total.fetch_add(1, Ordering::SeqCst);
        lock(&self.calls).push(url.clone());

        if lock(&self.failing).contains(&url) {
            return Err(WorkerError::Network(format!("fetch of {} failed", url)));
        }

        Ok(lock(&self.routes)
            .get(&url)
            .cloned()
            .unwrap_or_else(|| CachedResponse::new(404, "Not Found")))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
