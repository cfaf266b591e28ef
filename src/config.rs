//! Configuration Module
//!
//! Handles loading and managing configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::policy::{TagThresholds, TtlTable};

/// Shortest accepted expiry sweep interval in seconds
pub const MIN_CLEANUP_INTERVAL_SECS: u64 = 1;

/// Which backend the selector should try to bring up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPreference {
    /// Try Redis, fall back to the in-process backend
    Auto,
    /// Go straight to the in-process backend
    Local,
}

impl FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "redis" => Ok(Self::Auto),
            "local" | "memory" => Ok(Self::Local),
            other => Err(format!("unknown cache backend '{}'", other)),
        }
    }
}

/// Connection parameters for the distributed backend.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Logical database index used as the cache namespace
    pub db: i64,
}

impl RedisSettings {
    /// Renders the settings as a `redis://` connection URL.
    pub fn url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!(
                "{}:{}@",
                urlencoding::encode(user),
                urlencoding::encode(pass)
            ),
            (None, Some(pass)) => format!(":{}@", urlencoding::encode(pass)),
            (Some(user), None) => format!("{}@", urlencoding::encode(user)),
            (None, None) => String::new(),
        };
        format!("redis://{}{}:{}/{}", auth, self.host, self.port, self.db)
    }

    /// Address without credentials, for log lines.
    pub fn display_addr(&self) -> String {
        format!("{}:{} (db: {})", self.host, self.port, self.db)
    }
}

/// Everything the backend selector needs.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: BackendPreference,
    pub redis: RedisSettings,
    /// Upper bound on connect + health check at startup
    pub connect_timeout: Duration,
    pub is_development: bool,
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port for the admin surface
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    pub cache: CacheSettings,
    pub ttl: TtlTable,
    pub tags: TagThresholds,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 300)
    /// - `APP_ENV` - `development` enables dev defaults (default: development)
    /// - `CACHE_BACKEND` - `auto` or `local` (default: auto)
    /// - `REDIS_HOST` - (default: localhost in dev, backend-redis otherwise)
    /// - `REDIS_PORT` - (default: 6381 in dev, 6379 otherwise)
    /// - `REDIS_USERNAME`, `REDIS_PASSWORD` - optional credentials
    /// - `REDIS_DB` - logical database (default: 0)
    /// - `CACHE_CONNECT_TIMEOUT_MS` - startup connect bound (default: 5000)
    /// - `ACTIVE_USER_DAYS`, `RECENT_USER_DAYS`, `NEW_USER_DAYS` - tag thresholds
    pub fn from_env() -> Self {
        let defaults = TagThresholds::default();
        let is_development = env::var("APP_ENV")
            .map(|v| is_development_env(&v))
            .unwrap_or(true);

        let backend = match env::var("CACHE_BACKEND") {
            Ok(raw) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!("{}, falling back to auto", err);
                BackendPreference::Auto
            }),
            Err(_) => BackendPreference::Auto,
        };

        let redis = RedisSettings {
            host: env::var("REDIS_HOST").unwrap_or_else(|_| {
                if is_development {
                    "localhost".to_string()
                } else {
                    "backend-redis".to_string()
                }
            }),
            port: env_or("REDIS_PORT", if is_development { 6381 } else { 6379 }),
            username: non_empty_env("REDIS_USERNAME"),
            password: non_empty_env("REDIS_PASSWORD"),
            db: env_or("REDIS_DB", 0),
        };

        Self {
            server_port: env_or("SERVER_PORT", 3000),
            cleanup_interval: sweep_interval_secs(env_or("CLEANUP_INTERVAL", 300)),
            cache: CacheSettings {
                backend,
                redis,
                connect_timeout: Duration::from_millis(env_or("CACHE_CONNECT_TIMEOUT_MS", 5000)),
                is_development,
            },
            ttl: TtlTable::default(),
            tags: TagThresholds {
                active_days: env_or("ACTIVE_USER_DAYS", defaults.active_days),
                recent_days: env_or("RECENT_USER_DAYS", defaults.recent_days),
                new_registration_days: env_or("NEW_USER_DAYS", defaults.new_registration_days),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cleanup_interval: 300,
            cache: CacheSettings {
                backend: BackendPreference::Auto,
                redis: RedisSettings {
                    host: "localhost".to_string(),
                    port: 6381,
                    username: None,
                    password: None,
                    db: 0,
                },
                connect_timeout: Duration::from_secs(5),
                is_development: true,
            },
            ttl: TtlTable::default(),
            tags: TagThresholds::default(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// A zero interval would turn the expiry sweep into a busy loop.
fn sweep_interval_secs(secs: u64) -> u64 {
    secs.max(MIN_CLEANUP_INTERVAL_SECS)
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn is_development_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "development" | "dev" | "local" | "test"
    )
}
