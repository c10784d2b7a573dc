//! Cache Statistics Module
//!
//! Tracks lookup hits and misses, writes, and generation evictions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache store activity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups answered from a generation
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries written (including overwrites)
    pub puts: u64,
    /// Generations deleted
    pub evicted_generations: u64,
    /// Entries across all generations
    pub total_entries: usize,
    /// Known generations
    pub generations: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_put(&mut self) {
        self.puts += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evicted_generations += 1;
    }

    // == Update Sizes ==
    /// Updates the entry and generation counts.
    pub fn set_sizes(&mut self, total_entries: usize, generations: usize) {
        self.total_entries = total_entries;
        self.generations = generations;
    }
}

// == Lookup Counters ==
/// Hit and miss counters that lookups bump through a shared reference.
#[derive(Debug, Default)]
pub struct LookupCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LookupCounters {
    pub fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the counters into `stats`.
    pub fn fill(&self, stats: &mut CacheStats) {
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.misses = self.misses.load(Ordering::Relaxed);
    }
}
