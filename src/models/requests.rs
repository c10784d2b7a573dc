//! Request DTOs for the worker API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

use crate::worker::PageMessage;

/// Request body for POST /__worker/message
///
/// A page message, `{"type": "REFRESH_APP"}` or `{"type": "SKIP_WAITING"}`.
pub type MessageRequest = PageMessage;

/// Query string for GET /__worker/events
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQuery {
    /// URL of the subscribing page, kept for the status listing
    #[serde(default)]
    pub url: Option<String>,
    /// Whether the page is already controlled by the active worker
    #[serde(default)]
    pub controlled: bool,
}

impl EventsQuery {
    /// Validates the query
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        match &self.url {
            Some(url) if url.len() > 2048 => {
                Some("Page URL exceeds maximum length of 2048 characters".to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_request_deserialize() {
        let req: MessageRequest = serde_json::from_str(r#"{"type": "REFRESH_APP"}"#).unwrap();
        assert_eq!(req, PageMessage::RefreshApp);
    }

    #[test]
    fn test_events_query_defaults() {
        let query: EventsQuery = serde_json::from_str("{}").unwrap();
        assert!(query.url.is_none());
        assert!(!query.controlled);
        assert!(query.validate().is_none());
    }

    #[test]
    fn test_validate_long_url() {
        let query = EventsQuery {
            url: Some("x".repeat(3000)),
            controlled: false,
        };
        assert!(query.validate().is_some());
    }
}
