//! Shell Cache - An offline-first app shell cache worker
//!
//! Precaches a versioned manifest of assets, answers same-origin GET requests
//! cache-first, and refreshes the cached shell in place on request.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod page;
pub mod tasks;
pub mod worker;

pub use api::AppState;
pub use config::Config;
pub use error::{Result, WorkerError};
pub use page::PageContext;
pub use tasks::spawn_update_check_task;
pub use worker::{ServiceWorker, WorkerContext, WorkerOptions};
