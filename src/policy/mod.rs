//! Cache Policy Module
//!
//! Pure functions computing the TTL and tags attached to a cached user.

pub mod tags;
pub mod ttl;

pub use tags::{derive_tags, user_tag, TagThresholds};
pub use ttl::{cache_ttl, ttl_for_user, AccountStatus, TtlTable};
