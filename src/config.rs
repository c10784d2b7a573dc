//! Configuration Module
//!
//! Handles loading worker configuration from environment variables.

use std::env;
use std::path::PathBuf;

use crate::worker::WorkerOptions;

/// Assets precached when `PRECACHE_MANIFEST` is not set.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/app.js",
    "/register.js",
    "/data.json",
    "/exercises.json",
    "/Header.js",
    "/History.js",
    "/LastWeight.js",
];

/// Worker configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Origin the worker serves; same-origin requests are cached
    pub origin: String,
    /// Release version, part of the generation id
    pub app_version: String,
    /// Generation id prefix
    pub cache_prefix: String,
    /// Asset URLs precached at install, relative to the origin or absolute
    pub precache_manifest: Vec<String>,
    /// Extra origins absolute-form requests may be forwarded to
    pub passthrough_origins: Vec<String>,
    /// Cache directory; `None` keeps the cache in memory
    pub cache_dir: Option<PathBuf>,
    /// HTTP server port
    pub server_port: u16,
    /// Strip query strings from cache keys
    pub ignore_query: bool,
    /// Activate a newly installed worker without waiting
    pub skip_waiting: bool,
    /// Network request timeout in seconds
    pub fetch_timeout: u64,
    /// Background update check interval in seconds (0 disables it)
    pub refresh_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `ORIGIN` - Origin server (default: http://127.0.0.1:8080)
    /// - `APP_VERSION` - Release version (default: 1.0.0)
    /// - `CACHE_PREFIX` - Generation prefix (default: app-shell)
    /// - `PRECACHE_MANIFEST` - Comma-separated asset list (default: the app shell)
    /// - `PASSTHROUGH_ORIGINS` - Comma-separated extra forwardable origins (default: none)
    /// - `CACHE_DIR` - Cache directory, empty for in-memory (default: .shell-cache)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `IGNORE_QUERY` - Query-insensitive cache keys (default: true)
    /// - `SKIP_WAITING` - Activate immediately after install (default: true)
    /// - `FETCH_TIMEOUT` - Network timeout in seconds (default: 30)
    /// - `REFRESH_INTERVAL` - Update check frequency in seconds (default: 0, off)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            origin: env::var("ORIGIN").unwrap_or(defaults.origin),
            app_version: env::var("APP_VERSION").unwrap_or(defaults.app_version),
            cache_prefix: env::var("CACHE_PREFIX").unwrap_or(defaults.cache_prefix),
            precache_manifest: env::var("PRECACHE_MANIFEST")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.precache_manifest),
            passthrough_origins: env::var("PASSTHROUGH_ORIGINS")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.passthrough_origins),
            cache_dir: match env::var("CACHE_DIR") {
                Ok(dir) if dir.trim().is_empty() => None,
                Ok(dir) => Some(PathBuf::from(dir)),
                Err(_) => defaults.cache_dir,
            },
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.server_port),
            ignore_query: env::var("IGNORE_QUERY")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.ignore_query),
            skip_waiting: env::var("SKIP_WAITING")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.skip_waiting),
            fetch_timeout: env::var("FETCH_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fetch_timeout),
            refresh_interval: env::var("REFRESH_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.refresh_interval),
        }
    }

    /// Generation id for this release, `<prefix>-v<version>`.
    pub fn generation_id(&self) -> String {
        format!("{}-v{}", self.cache_prefix, self.app_version)
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            ignore_query: self.ignore_query,
            skip_waiting: self.skip_waiting,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8080".to_string(),
            app_version: "1.0.0".to_string(),
            cache_prefix: "app-shell".to_string(),
            precache_manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
            passthrough_origins: Vec::new(),
            cache_dir: Some(PathBuf::from(".shell-cache")),
            server_port: 3000,
            ignore_query: true,
            skip_waiting: true,
            fetch_timeout: 30,
            refresh_interval: 0,
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
