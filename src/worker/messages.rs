//! Messages exchanged between page contexts and the worker.
//!
//! Both directions are JSON objects with a `type` discriminator.

use serde::{Deserialize, Serialize};

/// Page → worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    /// Re-fetch every manifest asset into the current generation.
    RefreshApp,
    /// Activate a waiting worker without waiting for pages to close.
    SkipWaiting,
}

/// Worker → page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// A refresh finished; pages typically reload.
    RefreshAppDone,
}
