//! Cache Module
//!
//! Provides versioned, durable request→response storage organized in
//! generations.

mod entry;
pub mod generation;
mod key;
pub mod persist;
mod stats;
mod store;


// Re-export public types
pub use entry::{CacheEntry, CachedResponse};
pub use generation::{Generation, MatchOptions};
pub use key::RequestKey;
pub use persist::DiskStore;
pub use stats::{CacheStats, LookupCounters};
pub use store::{CacheStore, GenerationSummary, SharedStore};

// == Public Constants ==
/// Maximum allowed generation id length
pub const MAX_GENERATION_ID_LENGTH: usize = 128;
