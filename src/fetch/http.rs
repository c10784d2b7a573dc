//! reqwest-backed fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};

use crate::cache::CachedResponse;
use crate::error::{Result, WorkerError};
use crate::fetch::{FetchRequest, Fetcher, HOP_BY_HOP};

/// Fetches over HTTP(S) with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    /// Builds a client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("shell_cache/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| WorkerError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| WorkerError::InvalidRequest(format!("bad method: {}", e)))?;

        let mut builder = self.http.request(method, request.url.clone());
        for (name, value) in &request.headers {
            if name == "host" || HOP_BY_HOP.contains(&name.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.bypass_http_cache {
            builder = builder
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::PRAGMA, "no-cache");
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        let mut cached = CachedResponse::new(status, Vec::new());
        for (name, value) in response.headers() {
            if HOP_BY_HOP.contains(&name.as_str()) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                cached.headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        cached.body = response.bytes().await?.to_vec();

        Ok(cached)
    }
}
