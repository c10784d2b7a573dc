//! Request Interceptor
//!
//! Cache-first answering of same-origin GET requests out of the current
//! generation, with network fallback that stores successful responses.

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CachedResponse, MatchOptions, RequestKey};
use crate::error::Result;
use crate::fetch::FetchRequest;
use crate::worker::{wait_until, WorkerContext};

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    /// Served from the current generation.
    Cache,
    /// Fetched because the cache missed.
    Network,
    /// Not eligible for caching; forwarded untouched.
    Passthrough,
}

impl ResponseSource {
    /// Value for the `x-shell-cache` response header.
    pub fn as_header_value(&self) -> &'static str {
        match self {
            ResponseSource::Cache => "hit",
            ResponseSource::Network => "miss",
            ResponseSource::Passthrough => "pass",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Intercepted {
    pub response: CachedResponse,
    pub source: ResponseSource,
}

// == Request Interceptor ==
#[derive(Debug, Clone, Copy)]
pub struct RequestInterceptor {
    ignore_query: bool,
}

impl RequestInterceptor {
    pub fn new(ignore_query: bool) -> Self {
        Self { ignore_query }
    }

    fn match_options(&self) -> MatchOptions {
        MatchOptions {
            ignore_query: self.ignore_query,
        }
    }

    /// Answers `request`.
    ///
    /// Non-GET and cross-origin requests go straight to the network. Same-origin
    /// GETs are served from the current generation when present; on a miss the
    /// network response is returned and, when 2xx, stored first. Transport
    /// failures are returned as errors.
    pub async fn handle(&self, ctx: &WorkerContext, request: FetchRequest) -> Result<Intercepted> {
        if !request.is_safe_read() || !ctx.is_same_origin(&request.url) {
            debug!("pass {} {}", request.method, request.url);
            let response = ctx.fetcher.fetch(&request).await?;
            return Ok(Intercepted {
                response,
                source: ResponseSource::Passthrough,
            });
        }

        if request.is_navigation() {
            debug!("navigation to {}", request.url);
        }

        let key = RequestKey::get(&request.url);
        let (current, hit) = {
            let store = ctx.store.read().await;
            let current = store.current().map(str::to_string);
            let hit = current
                .as_deref()
                .and_then(|id| store.match_request(id, &key, self.match_options()));
            (current, hit)
        };
        let Some(generation) = current else {
            debug!("no current generation, fetching {}", request.url);
            let response = ctx.fetcher.fetch(&request).await?;
            return Ok(Intercepted {
                response,
                source: ResponseSource::Network,
            });
        };
        if let Some(response) = hit {
            debug!("hit {} in '{}'", key, generation);
            return Ok(Intercepted {
                response,
                source: ResponseSource::Cache,
            });
        }

        debug!("miss {} in '{}'", key, generation);
        let store_key = if self.ignore_query {
            key.without_query()
        } else {
            key
        };
        let ctx = ctx.clone();
        let response = wait_until(async move {
            let response = ctx.fetcher.fetch(&request).await?;
            if response.is_success() {
                let stored = ctx
                    .store
                    .write()
                    .await
                    .put(&generation, store_key, response.clone());
                if let Err(err) = stored {
                    warn!("Could not store {} in '{}': {}", request.url, generation, err);
                }
            }
            Ok(response)
        })
        .await?;

        Ok(Intercepted {
            response,
            source: ResponseSource::Network,
        })
    }
}
