//! Cache Module
//!
//! Tag-indexed caching with TTL expiration over a Redis backend or an
//! in-process fallback, selected once at startup.

mod backend;
mod clock;
mod distributed;
mod entry;
mod facade;
mod local;
mod metrics;
mod selector;
mod tag_index;


// Re-export public types
pub use backend::{CacheBackend, CacheStats};
pub use clock::{
    current_timestamp_ms, duration_ms, system_clock, Clock, ManualClock, SharedClock, SystemClock,
};
pub use distributed::{DistributedBackend, HEALTH_CHECK_KEY, REDIS_BACKEND_NAME};
pub use entry::{key_tag, CacheEntry, KEY_TAG_PREFIX};
pub use facade::Cache;
pub use local::{LocalBackend, LOCAL_BACKEND_NAME};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use selector::select_backend;
pub use tag_index::TagIndex;

// == Public Constants ==
/// Maximum accepted key or tag length in bytes on the admin API
pub const MAX_KEY_LENGTH: usize = 256;
