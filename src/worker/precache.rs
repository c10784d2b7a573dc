//! Precache Loader
//!
//! Fetches a fixed manifest of assets into a generation. Every URL is fetched
//! independently; failures are logged and skipped, never retried.

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::RequestKey;
use crate::error::{Result, WorkerError};
use crate::fetch::FetchRequest;
use crate::worker::WorkerContext;

// == Precache Manifest ==
/// Ordered, de-duplicated list of absolute asset URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecacheManifest {
    urls: Vec<Url>,
}

impl PrecacheManifest {
    /// Resolves each entry against `origin`. Absolute entries (such as CDN
    /// assets) are kept as they are.
    pub fn resolve<S: AsRef<str>>(origin: &Url, entries: &[S]) -> Result<Self> {
        let mut urls: Vec<Url> = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            let mut url = origin.join(entry).map_err(|e| {
                WorkerError::InvalidRequest(format!("bad manifest entry '{}': {}", entry, e))
            })?;
            url.set_fragment(None);
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(Self { urls })
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// The manifest as strings, the form stored alongside a generation.
    pub fn to_strings(&self) -> Vec<String> {
        self.urls.iter().map(Url::to_string).collect()
    }
}

/// An asset that could not be stored.
#[derive(Debug, Clone, Serialize)]
pub struct FailedAsset {
    pub url: String,
    pub error: String,
}

/// Outcome of fetching a manifest into a generation.
#[derive(Debug, Clone, Serialize)]
pub struct PrecacheReport {
    pub generation: String,
    pub stored: Vec<String>,
    pub failed: Vec<FailedAsset>,
}

impl PrecacheReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// == Fetch Into ==
/// Fetches every manifest URL, bypassing HTTP caches, and stores each
/// successful response in `generation`.
///
/// Used both at install time and for in-place refreshes.
pub async fn fetch_into(
    ctx: &WorkerContext,
    generation: &str,
    manifest: &PrecacheManifest,
) -> PrecacheReport {
    let fetches = manifest.urls().iter().map(|url| async move {
        let request = FetchRequest::reload(url.clone());
        let result = match ctx.fetcher.fetch(&request).await {
            Ok(response) if response.is_success() => ctx
                .store
                .write()
                .await
                .put(generation, RequestKey::get(url), response),
            Ok(response) => Err(WorkerError::Network(format!(
                "unexpected status {}",
                response.status
            ))),
            Err(err) => Err(err),
        };
        (url, result)
    });

    let mut report = PrecacheReport {
        generation: generation.to_string(),
        stored: Vec::new(),
        failed: Vec::new(),
    };

    for (url, result) in join_all(fetches).await {
        match result {
            Ok(()) => {
                debug!("Cached {} into '{}'", url, generation);
                report.stored.push(url.to_string());
            }
            Err(err) => {
                warn!("Skipping {} for '{}': {}", url, generation, err);
                report.failed.push(FailedAsset {
                    url: url.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        "Fetched {}/{} manifest assets into '{}'",
        report.stored.len(),
        manifest.len(),
        generation
    );
    report
}
