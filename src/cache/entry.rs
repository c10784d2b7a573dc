//! Cache Entry Module
//!
//! Defines stored responses and the entries that hold them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::cache::RequestKey;

// == Cached Response ==
/// A response as mirrored from the network: status, headers and an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, lower-cased names
    pub headers: BTreeMap<String, String>,
    /// Response body bytes
    pub body: Vec<u8>,
}

impl CachedResponse {
    // == Constructor ==
    /// Creates a response with the given status and body and no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Creates a `200 OK` response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    /// Adds a header, lower-casing its name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Returns true for 2xx statuses, the only ones worth caching.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

// == Cache Entry ==
/// A stored response plus the time it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key the response is stored under
    pub key: RequestKey,
    /// The stored response
    pub response: CachedResponse,
    /// When the entry was last written
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(key: RequestKey, response: CachedResponse) -> Self {
        Self {
            key,
            response,
            cached_at: Utc::now(),
        }
    }

    /// Age of the entry in seconds.
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.cached_at).num_seconds().max(0)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_success_range() {
        assert!(CachedResponse::ok("x").is_success());
        assert!(CachedResponse::new(204, Vec::new()).is_success());
        assert!(!CachedResponse::new(304, Vec::new()).is_success());
        assert!(!CachedResponse::new(404, "missing").is_success());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = CachedResponse::ok("{}").with_header("Content-Type", "application/json");

        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(response.header("etag"), None);
    }

    #[test]
    fn test_entry_age_starts_near_zero() {
        let key = RequestKey::parse_get("https://app.example/").unwrap();
        let entry = CacheEntry::new(key, CachedResponse::ok("<html>"));

        assert!(entry.age_secs() <= 1);
    }
}
