//! Request Key Module
//!
//! Identifies a cached request by method and URL.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::Result;

// == Request Key ==
/// Identity of a cached request: upper-cased method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    /// HTTP method, upper-cased
    pub method: String,
    /// Absolute URL with the fragment removed
    pub url: String,
}

impl RequestKey {
    // == Constructor ==
    /// Creates a key for the given method and URL.
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// Creates a GET key, the only kind the interceptor stores.
    pub fn get(url: &Url) -> Self {
        Self::new("GET", url)
    }

    /// Parses `url` and creates a GET key.
    pub fn parse_get(url: &str) -> Result<Self> {
        Ok(Self::get(&Url::parse(url)?))
    }

    // == Query Normalization ==
    /// Returns the same key with the query string stripped.
    pub fn without_query(&self) -> Self {
        let url = match self.url.split_once('?') {
            Some((base, _)) => base.to_string(),
            None => self.url.clone(),
        };
        Self {
            method: self.method.clone(),
            url,
        }
    }

    /// Returns true if the URL carries a query string.
    pub fn has_query(&self) -> bool {
        self.url.contains('?')
    }

    // == Digest ==
    /// Stable hex digest used to name this key's files on disk.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
