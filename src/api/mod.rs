//! API Module
//!
//! Admin HTTP surface over the shared cache.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /cache/stats` - Backend statistics
//! - `GET /cache/metrics` - Facade counters
//! - `DELETE /cache/keys/:key` - Invalidate a key
//! - `POST /cache/invalidate` - Invalidate by tags
//! - `DELETE /cache` - Clear everything

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
