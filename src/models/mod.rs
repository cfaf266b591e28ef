//! Data models
//!
//! The cached user record plus the DTOs of the admin HTTP API.

pub mod requests;
pub mod responses;
pub mod user;

// Re-export commonly used types
pub use requests::InvalidateTagsRequest;
pub use responses::{AckResponse, ErrorResponse, HealthResponse, StatsResponse};
pub use user::{ProfileSnapshot, SuperUserRecord, UserSnapshot};
