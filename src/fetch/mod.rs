//! Network Fetch Module
//!
//! The worker's only way to reach the network. `HttpFetcher` talks to real
//! servers; `MemoryFetcher` serves canned responses.

mod http;
mod memory;

use async_trait::async_trait;
use url::Url;

use crate::cache::CachedResponse;
use crate::error::Result;

pub use http::HttpFetcher;
pub use memory::MemoryFetcher;

/// Headers that describe a single hop and are never forwarded or replayed.
pub(crate) const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "proxy-connection",
];

// == Fetch Request ==
/// An outgoing request as seen by the worker.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// HTTP method, upper-cased
    pub method: String,
    /// Absolute request URL
    pub url: Url,
    /// Request headers, lower-cased names
    pub headers: Vec<(String, String)>,
    /// Request body (empty for reads)
    pub body: Vec<u8>,
    /// Skip any HTTP-level cache between the worker and the origin
    pub bypass_http_cache: bool,
}

impl FetchRequest {
    /// A plain GET for `url`.
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            headers: Vec::new(),
            body: Vec::new(),
            bypass_http_cache: false,
        }
    }

    /// A GET that bypasses HTTP caches, as used for precache and refresh.
    pub fn reload(url: Url) -> Self {
        Self {
            bypass_http_cache: true,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True for GET, the only request kind the worker answers from cache.
    pub fn is_safe_read(&self) -> bool {
        self.method == "GET"
    }

    /// True for top-level document loads.
    pub fn is_navigation(&self) -> bool {
        if let Some(mode) = self.header("sec-fetch-mode") {
            return mode.eq_ignore_ascii_case("navigate");
        }
        self.header("accept")
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false)
    }
}

// == Fetcher Trait ==
/// Performs network requests on the worker's behalf.
///
/// Transport failures are errors; HTTP error statuses are ordinary responses.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse>;
}
