//! User Cache
//!
//! Read-through caching of user snapshots keyed by Telegram id, with tags
//! and lifetimes taken from the cache policy, plus the invalidation hooks
//! the account flows call after a write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cache::{duration_ms, Cache};
use crate::config::Config;
use crate::models::UserSnapshot;
use crate::policy::tags::{NEW_USERS, ONBOARDING_COMPLETED, RECENT_REGISTRATIONS};
use crate::policy::{derive_tags, ttl_for_user, user_tag, TagThresholds, TtlTable};

/// Persistent store consulted on a cache miss.
#[async_trait]
pub trait UserSource: Send + Sync {
    /// Loads the user with this Telegram id, `None` when there is none.
    async fn load(&self, telegram_id: &str) -> anyhow::Result<Option<UserSnapshot>>;
}

/// User-shaped view over the shared cache.
#[derive(Clone)]
pub struct UserCache {
    cache: Cache,
    ttl: TtlTable,
    thresholds: TagThresholds,
}

impl UserCache {
    pub fn new(cache: Cache, ttl: TtlTable, thresholds: TagThresholds) -> Self {
        Self {
            cache,
            ttl,
            thresholds,
        }
    }

    pub fn from_config(cache: Cache, config: &Config) -> Self {
        Self::new(cache, config.ttl.clone(), config.tags.clone())
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    // == Lookup ==
    /// Returns the cached snapshot, or loads it from `source` and caches it.
    ///
    /// Unknown users are not cached, so a later registration is seen at once.
    pub async fn lookup(
        &self,
        telegram_id: &str,
        source: &dyn UserSource,
    ) -> anyhow::Result<Option<UserSnapshot>> {
        self.lookup_at(telegram_id, source, Utc::now()).await
    }

    async fn lookup_at(
        &self,
        telegram_id: &str,
        source: &dyn UserSource,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<UserSnapshot>> {
        if let Some(user) = self.cache.get::<UserSnapshot>(telegram_id).await {
            return Ok(Some(user));
        }

        let Some(user) = source.load(telegram_id).await? else {
            debug!(telegram_id, "User not found, nothing cached");
            return Ok(None);
        };

        let tags: Vec<String> = derive_tags(&user, now, &self.thresholds)
            .into_iter()
            .collect();
        let ttl = ttl_for_user(&user, now, &self.ttl);

        debug!(
            telegram_id,
            ttl_ms = duration_ms(ttl),
            tags = tags.len(),
            "Caching user"
        );
        self.cache.set(telegram_id, &user, ttl, &tags).await;
        Ok(Some(user))
    }

    // == Invalidation Hooks ==
    pub async fn profile_updated(&self, user_id: &str) {
        self.cache.invalidate_by_tags(&[user_tag(user_id)]).await;
    }

    pub async fn onboarding_completed(&self, user_id: &str) {
        self.cache
            .invalidate_by_tags(&[user_tag(user_id), ONBOARDING_COMPLETED.to_string()])
            .await;
    }

    /// A new account changes the membership of the registration buckets.
    pub async fn registered(&self, user_id: &str) {
        self.cache
            .invalidate_by_tags(&[
                user_tag(user_id),
                NEW_USERS.to_string(),
                RECENT_REGISTRATIONS.to_string(),
            ])
            .await;
    }

    pub async fn forget(&self, telegram_id: &str) {
        self.cache.invalidate_key(telegram_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProfileSnapshot;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockSource {
        users: HashMap<String, UserSnapshot>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockSource {
        fn with(users: Vec<UserSnapshot>) -> Self {
            Self {
                users: users
                    .into_iter()
                    .map(|u| (u.telegram_id.clone(), u))
                    .collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UserSource for MockSource {
        async fn load(&self, telegram_id: &str) -> anyhow::Result<Option<UserSnapshot>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("database unavailable");
            }
            Ok(self.users.get(telegram_id).cloned())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn user(id: &str, telegram_id: &str) -> UserSnapshot {
        UserSnapshot {
            id: id.to_string(),
            telegram_id: telegram_id.to_string(),
            is_accepted: true,
            profile: None,
            super_user: None,
            created_at: Some(now() - chrono::Duration::days(30)),
            updated_at: Some(now()),
            last_login_at: Some(now()),
        }
    }

    fn users() -> UserCache {
        UserCache::from_config(Cache::local(), &Config::default())
    }

    #[tokio::test]
    async fn test_lookup_loads_once() {
        let cache = users();
        let source = MockSource::with(vec![user("u1", "100")]);

        let first = cache.lookup_at("100", &source, now()).await.unwrap();
        let second = cache.lookup_at("100", &source, now()).await.unwrap();

        assert_eq!(first, Some(user("u1", "100")));
        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.cache().metrics().hits, 1);
    }

    #[tokio::test]
    async fn test_lookup_attaches_policy_tags() {
        let cache = users();
        let source = MockSource::with(vec![user("u1", "100")]);

        cache.lookup_at("100", &source, now()).await.unwrap();

        let tags = cache.cache().stats().await.tags;
        assert!(tags.contains(&"user:u1".to_string()));
        assert!(tags.contains(&"user:100".to_string()));
        assert!(tags.contains(&"accepted_users".to_string()));
        assert!(tags.contains(&"active_users".to_string()));
    }

    #[tokio::test]
    async fn test_missing_user_not_cached() {
        let cache = users();
        let source = MockSource::default();

        assert_eq!(cache.lookup("404", &source).await.unwrap(), None);
        assert_eq!(cache.lookup("404", &source).await.unwrap(), None);

        assert_eq!(source.calls(), 2);
        assert_eq!(cache.cache().stats().await.size, 0);
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let cache = users();
        let source = MockSource {
            fail: true,
            ..MockSource::default()
        };

        let err = cache.lookup("100", &source).await.unwrap_err();
        assert!(err.to_string().contains("database unavailable"));
        assert_eq!(cache.cache().stats().await.size, 0);
    }

    #[tokio::test]
    async fn test_profile_updated_drops_user_entry() {
        let cache = users();
        let source = MockSource::with(vec![user("u1", "100"), user("u2", "200")]);
        cache.lookup_at("100", &source, now()).await.unwrap();
        cache.lookup_at("200", &source, now()).await.unwrap();

        cache.profile_updated("u1").await;
        cache.lookup_at("100", &source, now()).await.unwrap();
        cache.lookup_at("200", &source, now()).await.unwrap();

        // Only "100" went back to the source.
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_registered_drops_new_user_buckets() {
        let cache = users();
        let mut onboarding = user("u2", "200");
        onboarding.profile = Some(ProfileSnapshot {
            name: None,
            avatar_path: None,
            is_new: true,
            updated_at: None,
        });
        let source = MockSource::with(vec![user("u1", "100"), onboarding]);
        cache.lookup_at("100", &source, now()).await.unwrap();
        cache.lookup_at("200", &source, now()).await.unwrap();

        cache.registered("u3").await;

        let stats = cache.cache().stats().await;
        assert_eq!(stats.size, 1);
        assert!(!stats.tags.contains(&"new_users".to_string()));
        assert_eq!(cache.cache().metrics().invalidations, 1);
    }

    #[tokio::test]
    async fn test_onboarding_completed_and_forget() {
        let cache = users();
        let source = MockSource::with(vec![user("u1", "100"), user("u2", "200")]);
        cache.lookup_at("100", &source, now()).await.unwrap();
        cache.lookup_at("200", &source, now()).await.unwrap();

        cache.onboarding_completed("u1").await;
        assert_eq!(cache.cache().stats().await.size, 1);

        cache.forget("200").await;
        assert_eq!(cache.cache().stats().await.size, 0);
    }
}
