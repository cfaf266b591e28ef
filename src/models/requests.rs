//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::cache::MAX_KEY_LENGTH;

/// Request body for bulk invalidation (POST /cache/invalidate)
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateTagsRequest {
    /// Tags whose entries should be dropped
    pub tags: Vec<String>,
}

impl InvalidateTagsRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.tags.is_empty() {
            return Some("At least one tag is required".to_string());
        }
        if self.tags.iter().any(|t| t.is_empty()) {
            return Some("Tags cannot be empty".to_string());
        }
        if self.tags.iter().any(|t| t.len() > MAX_KEY_LENGTH) {
            return Some(format!(
                "Tag exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        None
    }
}
