//! Backend Selector
//!
//! Picks the backend once at startup: Redis if it connects and serves a
//! round trip within the configured bound, otherwise the in-process backend.
//! The choice holds for the life of the process.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::cache::backend::CacheBackend;
use crate::cache::clock::SharedClock;
use crate::cache::distributed::DistributedBackend;
use crate::cache::local::LocalBackend;
use crate::config::{BackendPreference, CacheSettings};
use crate::error::{CacheError, Result};

/// Selects and constructs the active backend.
pub async fn select_backend(
    settings: &CacheSettings,
    clock: SharedClock,
) -> Arc<dyn CacheBackend> {
    if settings.backend == BackendPreference::Local {
        info!("Cache backend set to in-memory by configuration");
        return Arc::new(LocalBackend::with_clock(clock));
    }

    let mode = if settings.is_development { "DEV" } else { "PROD" };
    info!(
        "Attempting to connect to Redis cache ({} mode - {})",
        mode,
        settings.redis.display_addr()
    );

    match connect_checked(settings, clock.clone()).await {
        Ok(backend) => {
            info!("Redis cache connection successful");
            Arc::new(backend)
        }
        Err(err) => {
            warn!("Redis cache connection failed: {}", err);
            warn!("FALLBACK: using IN-MEMORY cache, data will be lost on restart");
            if !settings.is_development {
                error!("In-memory cache in PRODUCTION mode, fix the Redis connection");
            }
            Arc::new(LocalBackend::with_clock(clock))
        }
    }
}

/// Connects and health-checks Redis under a single deadline.
async fn connect_checked(
    settings: &CacheSettings,
    clock: SharedClock,
) -> Result<DistributedBackend> {
    let bound = settings.connect_timeout;

    let attempt = async {
        let backend = DistributedBackend::connect(&settings.redis, clock).await?;
        backend.health_check().await?;
        Ok::<_, CacheError>(backend)
    };

    timeout(bound, attempt).await.map_err(|_| {
        CacheError::Timeout(format!(
            "Redis connection timeout ({}ms)",
            bound.as_millis()
        ))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::system_clock;
    use crate::config::Config;
    use std::time::{Duration, Instant};

    fn unreachable_settings(timeout: Duration) -> CacheSettings {
        let mut settings = Config::default().cache;
        settings.redis.host = "127.0.0.1".to_string();
        settings.redis.port = 1;
        settings.connect_timeout = timeout;
        settings
    }

    #[tokio::test]
    async fn test_forced_local_skips_redis() {
        let mut settings = unreachable_settings(Duration::from_secs(30));
        settings.backend = BackendPreference::Local;

        let started = Instant::now();
        let backend = select_backend(&settings, system_clock()).await;

        assert_eq!(backend.name(), "local");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_local() {
        let settings = unreachable_settings(Duration::from_millis(500));

        let started = Instant::now();
        let backend = select_backend(&settings, system_clock()).await;

        assert_eq!(backend.name(), "local");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failed_connect_reports_timeout_or_connection_error() {
        let settings = unreachable_settings(Duration::from_millis(200));

        let err = connect_checked(&settings, system_clock()).await.err();
        assert!(matches!(
            err,
            Some(CacheError::Timeout(_))
                | Some(CacheError::Connection(_))
                | Some(CacheError::Redis(_))
        ));
    }
}
