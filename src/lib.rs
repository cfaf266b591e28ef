//! Tagged Cache - tag-indexed user cache with Redis and in-memory backends
//!
//! Caches user snapshots under TTLs chosen per account status, groups entries
//! by tags for bulk invalidation, and falls back to an in-process backend when
//! Redis is unreachable at startup.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod policy;
pub mod tasks;
pub mod users;

pub use api::AppState;
pub use cache::{select_backend, Cache, CacheBackend};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
pub use users::{UserCache, UserSource};
