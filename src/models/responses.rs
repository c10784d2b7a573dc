//! Response DTOs for the worker API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, GenerationSummary};
use crate::worker::{ClientInfo, WorkerOptions, WorkerState};

/// Cache counters as reported by GET /__worker/status
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of entries written
    pub puts: u64,
    /// Number of generations deleted
    pub evicted_generations: u64,
    /// Current number of entries across generations
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            puts: stats.puts,
            evicted_generations: stats.evicted_generations,
            total_entries: stats.total_entries,
        }
    }
}

/// Response body for GET /__worker/status
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// Release version of the running worker
    pub version: String,
    /// Generation this worker owns
    pub generation: String,
    /// Lifecycle state of this worker
    pub state: WorkerState,
    /// Generation currently served
    pub current: Option<String>,
    /// Whether a refresh is in flight
    pub refreshing: bool,
    pub options: WorkerOptions,
    pub generations: Vec<GenerationSummary>,
    pub stats: StatsResponse,
    /// Connected pages
    pub clients: Vec<ClientInfo>,
}

/// Response body for POST /__worker/message
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    /// Message type that was handled
    #[serde(rename = "type")]
    pub kind: String,
    /// What happened, e.g. "accepted" or "activated"
    pub status: String,
    /// Lifecycle state after handling, when the message changes it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<WorkerState>,
}

impl MessageResponse {
    /// A REFRESH_APP accepted for background processing
    pub fn refresh_accepted() -> Self {
        Self {
            kind: "REFRESH_APP".to_string(),
            status: "accepted".to_string(),
            state: None,
        }
    }

    /// A SKIP_WAITING handled, reporting the resulting state
    pub fn skip_waiting(state: WorkerState) -> Self {
        Self {
            kind: "SKIP_WAITING".to_string(),
            status: state.to_string(),
            state: Some(state),
        }
    }
}

/// Response body for the health endpoint (GET /__worker/health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
