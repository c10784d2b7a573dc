//! Request and Response models for the worker API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing bodies of the `/__worker` endpoints.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{EventsQuery, MessageRequest};
pub use responses::{
    ErrorResponse, HealthResponse, MessageResponse, StatsResponse, StatusResponse,
};
