//! Redis Backend Module
//!
//! Entries live in Redis as JSON with a native expiry; the tag index lives
//! only in this process. After a restart the index is empty, so tag
//! invalidation no longer reaches entries written before it. Those entries
//! still expire on their own.
//!
//! Redis does not tell us in which order concurrent commands landed, so the
//! index may register a key under more tags than its live payload carries,
//! never fewer. Over-invalidation only costs a reload.
//!
//! Every operation is best-effort. A backend that is not ready answers
//! reads with a miss and drops writes; Redis errors are logged and
//! swallowed.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, Script};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache::backend::{CacheBackend, CacheStats};
use crate::cache::clock::{duration_ms, SharedClock};
use crate::cache::entry::CacheEntry;
use crate::cache::tag_index::TagIndex;
use crate::config::RedisSettings;
use crate::error::{CacheError, Result};

pub const REDIS_BACKEND_NAME: &str = "redis";

/// Key written and removed by the startup health check.
pub const HEALTH_CHECK_KEY: &str = "__health_check__";

// Rewrites the entry only if nobody replaced it since it was read, so a
// read never clobbers a newer write.
const TOUCH_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('PSETEX', KEYS[1], ARGV[3], ARGV[2])
    return 1
end
return 0
"#;

// Deletes the entry only if it still holds the payload that was read.
const DELETE_IF_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

// == Error Classification ==
/// Outage-class errors: the server is gone or unreachable.
fn is_connection_error(err: &RedisError) -> bool {
    err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error()
}

/// Errors expected during an outage, logged at low severity.
fn is_expected_error(err: &RedisError) -> bool {
    is_connection_error(err) || err.is_timeout()
}

/// Startup errors: unreachable servers become `Connection`, the rest stay
/// Redis errors.
fn connect_error(addr: &str, err: RedisError) -> CacheError {
    if is_connection_error(&err) {
        CacheError::Connection(format!("{}: {}", addr, err))
    } else {
        CacheError::Redis(err)
    }
}

// == Payload ==
fn encode(entry: &CacheEntry) -> Result<String> {
    Ok(serde_json::to_string(entry)?)
}

/// What a payload read from Redis turned out to hold.
#[derive(Debug, PartialEq)]
enum Inspected {
    Expired,
    /// `touched` is the payload rewritten with the new last access time.
    Live {
        entry: CacheEntry,
        touched: Option<String>,
    },
}

/// Decodes a stored payload and checks it against `now`.
///
/// Undecodable payloads are errors; the caller treats them as misses and
/// leaves them in place.
fn inspect_payload(raw: &str, now: u64) -> Result<Inspected> {
    let mut entry: CacheEntry = serde_json::from_str(raw)?;
    if entry.is_expired_at(now) {
        return Ok(Inspected::Expired);
    }

    entry.last_access_at = now;
    let touched = encode(&entry).ok();
    Ok(Inspected::Live { entry, touched })
}

// == Remote Index ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexRecord {
    expires_at: u64,
    /// Registration order; every change to the index gets a larger one.
    stamp: u64,
}

/// Writes to one key that have started but not settled.
#[derive(Debug, Default)]
struct WriteState {
    in_flight: u32,
    started: u64,
    tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WriteTicket {
    seq: u64,
    overlapped: bool,
}

/// Local tag index plus the expiry and registration stamp of each key.
///
/// Invariant: every key Redis may hold a live payload for (written by this
/// process) is registered under at least that payload's tags, or has a
/// write in flight carrying them.
#[derive(Debug, Default)]
struct RemoteIndex {
    tags: TagIndex,
    records: HashMap<String, IndexRecord>,
    writes: HashMap<String, WriteState>,
    stamp: u64,
}

impl RemoteIndex {
    /// Current stamp. Registrations made after this call compare greater.
    fn mark(&self) -> u64 {
        self.stamp
    }

    fn changed_since(&self, key: &str, mark: u64) -> bool {
        self.records.get(key).is_some_and(|r| r.stamp > mark)
    }

    // == Writes ==
    fn begin_write(&mut self, key: &str, tags: &BTreeSet<String>) -> WriteTicket {
        let state = self.writes.entry(key.to_string()).or_default();
        let overlapped = state.in_flight > 0;
        state.in_flight += 1;
        state.started += 1;
        state.tags.extend(tags.iter().cloned());
        WriteTicket {
            seq: state.started,
            overlapped,
        }
    }

    /// Settles a write; `entry` is `None` when it never reached Redis.
    ///
    /// A write that overlapped another on the same key cannot know which
    /// payload Redis kept, so it adds to the registered tags instead of
    /// replacing them.
    fn finish_write(&mut self, key: &str, ticket: WriteTicket, entry: Option<&CacheEntry>) {
        let mut overlapped = ticket.overlapped;
        if let Some(state) = self.writes.get_mut(key) {
            overlapped |= state.in_flight > 1 || state.started != ticket.seq;
            state.in_flight = state.in_flight.saturating_sub(1);
            if state.in_flight == 0 {
                self.writes.remove(key);
            }
        }

        match entry {
            Some(entry) if overlapped => self.merge(key, entry),
            Some(entry) => self.register(key, &entry.tags, entry.expires_at),
            None => {}
        }
    }

    fn register(&mut self, key: &str, tags: &BTreeSet<String>, expires_at: u64) {
        self.stamp += 1;
        self.tags.insert(key, tags);
        self.records.insert(
            key.to_string(),
            IndexRecord {
                expires_at,
                stamp: self.stamp,
            },
        );
    }

    fn merge(&mut self, key: &str, entry: &CacheEntry) {
        let mut tags = self.tags.tags_of(key).cloned().unwrap_or_default();
        tags.extend(entry.tags.iter().cloned());
        let expires_at = self
            .records
            .get(key)
            .map_or(entry.expires_at, |r| r.expires_at.max(entry.expires_at));
        self.register(key, &tags, expires_at);
    }

    // == Reads ==
    /// Re-registers `key` from a payload read back from Redis, unless it was
    /// registered again after `mark` or a write to it is still in flight.
    fn refresh(&mut self, key: &str, entry: &CacheEntry, mark: u64) -> bool {
        if self.changed_since(key, mark) || self.writes.contains_key(key) {
            return false;
        }
        let current = self.records.get(key).map(|r| r.expires_at);
        if current == Some(entry.expires_at) && self.tags.tags_of(key) == Some(&entry.tags) {
            return false;
        }
        self.register(key, &entry.tags, entry.expires_at);
        true
    }

    // == Removal ==
    /// Keys to delete for a bulk invalidation, including keys whose pending
    /// write carries one of `tags`.
    fn keys_for(&self, tags: &[String]) -> HashSet<String> {
        let mut keys = self.tags.keys_for(tags);
        keys.extend(
            self.writes
                .iter()
                .filter(|(_, w)| tags.iter().any(|t| w.tags.contains(t)))
                .map(|(key, _)| key.clone()),
        );
        keys
    }

    fn remove(&mut self, key: &str) {
        self.tags.remove(key);
        self.records.remove(key);
    }

    /// Drops the residue of `key` unless it was registered again after
    /// `mark`.
    fn remove_if_unchanged(&mut self, key: &str, mark: u64) -> bool {
        if self.changed_since(key, mark) || !self.records.contains_key(key) {
            return false;
        }
        self.remove(key);
        true
    }

    /// Drops every registration made up to `mark`.
    fn clear_until(&mut self, mark: u64) {
        let stale: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| r.stamp <= mark)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.remove(key);
        }
    }

    fn purge_expired(&mut self, now: u64) -> usize {
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| now >= r.expires_at)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

/// A write registered in the index; settles as failed if dropped unsettled,
/// so a cancelled `set` does not leave the key marked in flight.
struct PendingWrite<'a> {
    index: &'a Mutex<RemoteIndex>,
    key: &'a str,
    ticket: WriteTicket,
    settled: bool,
}

impl<'a> PendingWrite<'a> {
    fn begin(index: &'a Mutex<RemoteIndex>, key: &'a str, tags: &BTreeSet<String>) -> Self {
        let ticket = index.lock().begin_write(key, tags);
        Self {
            index,
            key,
            ticket,
            settled: false,
        }
    }

    fn finish(mut self, entry: &CacheEntry) {
        self.settled = true;
        self.index
            .lock()
            .finish_write(self.key, self.ticket, Some(entry));
    }
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.index.lock().finish_write(self.key, self.ticket, None);
        }
    }
}

// == Distributed Backend ==
/// Redis-backed cache with a process-local tag index.
pub struct DistributedBackend {
    conn: MultiplexedConnection,
    touch_script: Script,
    delete_script: Script,
    ready: AtomicBool,
    outage_logged: AtomicBool,
    index: Mutex<RemoteIndex>,
    version: AtomicU64,
    clock: SharedClock,
    addr: String,
}

impl DistributedBackend {
    // == Connect ==
    /// Opens one multiplexed connection to the configured server.
    ///
    /// Not bounded by any timeout on its own; the selector races it.
    pub async fn connect(settings: &RedisSettings, clock: SharedClock) -> Result<Self> {
        Self::open(&settings.url(), settings.display_addr(), clock).await
    }

    async fn open(url: &str, addr: String, clock: SharedClock) -> Result<Self> {
        info!("Connecting to Redis at {}", addr);

        let client = redis::Client::open(url)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| connect_error(&addr, err))?;

        info!("Connected to Redis cache at {}", addr);

        Ok(Self {
            conn,
            touch_script: Script::new(TOUCH_SCRIPT),
            delete_script: Script::new(DELETE_IF_SCRIPT),
            ready: AtomicBool::new(true),
            outage_logged: AtomicBool::new(false),
            index: Mutex::new(RemoteIndex::default()),
            version: AtomicU64::new(1),
            clock,
            addr,
        })
    }

    // == Health Check ==
    /// Round-trip write and delete proving the server actually serves
    /// requests. Unlike the cache operations, errors are returned.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(HEALTH_CHECK_KEY, "true", 5_000)
            .await
            .map_err(|err| connect_error(&self.addr, err))?;
        conn.del::<_, ()>(HEALTH_CHECK_KEY)
            .await
            .map_err(|err| connect_error(&self.addr, err))?;
        debug!("Redis health check passed");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn touch(&self, key: &str, raw: &str, touched: String, ttl_ms: u64) {
        let mut conn = self.conn.clone();
        let result: std::result::Result<i64, RedisError> = self
            .touch_script
            .key(key)
            .arg(raw)
            .arg(touched)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await;
        if let Err(err) = result {
            self.handle_error("touch", key, err);
        }
    }

    /// Deletes an expired payload unless a newer write replaced it.
    async fn delete_expired(&self, key: &str, raw: &str, mark: u64) {
        let mut conn = self.conn.clone();
        let result: std::result::Result<i64, RedisError> = self
            .delete_script
            .key(key)
            .arg(raw)
            .invoke_async(&mut conn)
            .await;
        match result {
            Ok(_) => {
                self.index.lock().remove_if_unchanged(key, mark);
                debug!(key, "Lazy expiry on read");
            }
            Err(err) => self.handle_error("del", key, err),
        }
    }

    // == Error Handling ==
    fn handle_error(&self, op: &'static str, key: &str, err: RedisError) {
        if is_connection_error(&err) {
            self.ready.store(false, Ordering::Release);
        }

        if is_expected_error(&err) {
            // One warning per outage, the rest at debug.
            if !self.outage_logged.swap(true, Ordering::AcqRel) {
                warn!(
                    op,
                    error = %err,
                    "Redis ({}) unavailable, cache operations degraded",
                    self.addr
                );
            } else {
                debug!(op, key, error = %err, "Redis still unavailable");
            }
        } else {
            error!(op, key, error = %err, "Redis cache unexpected error");
        }
    }
}

#[async_trait]
impl CacheBackend for DistributedBackend {
    fn name(&self) -> &'static str {
        REDIS_BACKEND_NAME
    }

    async fn get(&self, key: &str) -> Option<Value> {
        if !self.is_ready() {
            return None;
        }

        let mark = self.index.lock().mark();
        let mut conn = self.conn.clone();
        let raw = match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                // Expired or evicted remotely.
                self.index.lock().remove_if_unchanged(key, mark);
                return None;
            }
            Err(err) => {
                self.handle_error("get", key, err);
                return None;
            }
        };

        let now = self.clock.now_ms();
        match inspect_payload(&raw, now) {
            Ok(Inspected::Live { entry, touched }) => {
                self.index.lock().refresh(key, &entry, mark);
                if let Some(touched) = touched {
                    self.touch(key, &raw, touched, entry.ttl_remaining_ms(now))
                        .await;
                }
                Some(entry.value)
            }
            Ok(Inspected::Expired) => {
                self.delete_expired(key, &raw, mark).await;
                None
            }
            Err(err) => {
                warn!(key, error = %err, "Malformed cache payload, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration, tags: &[String]) {
        if !self.is_ready() {
            return;
        }

        // PSETEX rejects 0, and anything under a millisecond rounds to it.
        let ttl_ms = duration_ms(ttl);
        if ttl_ms == 0 {
            self.invalidate_key(key).await;
            return;
        }

        let now = self.clock.now_ms();
        let entry = CacheEntry::new(
            key,
            value,
            ttl,
            tags,
            self.version.load(Ordering::Acquire),
            now,
        );
        let payload = match encode(&entry) {
            Ok(payload) => payload,
            Err(err) => {
                error!(key, error = %err, "Failed to encode cache entry");
                return;
            }
        };

        let write = PendingWrite::begin(&self.index, key, &entry.tags);
        let mut conn = self.conn.clone();
        match conn.pset_ex::<_, _, ()>(key, payload, ttl_ms).await {
            Ok(()) => {
                write.finish(&entry);
                debug!(key, ttl_ms, "Cache set");
            }
            Err(err) => {
                drop(write);
                self.handle_error("set", key, err);
            }
        }
    }

    async fn invalidate_key(&self, key: &str) {
        if !self.is_ready() {
            return;
        }

        let mark = self.index.lock().mark();
        let mut conn = self.conn.clone();
        match conn.del::<_, ()>(key).await {
            Ok(()) => {
                self.index.lock().remove_if_unchanged(key, mark);
            }
            Err(err) => self.handle_error("del", key, err),
        }
    }

    async fn invalidate_by_tags(&self, tags: &[String]) {
        if !self.is_ready() {
            return;
        }

        let (keys, mark) = {
            let index = self.index.lock();
            let keys: Vec<String> = index.keys_for(tags).into_iter().collect();
            (keys, index.mark())
        };
        if keys.is_empty() {
            return;
        }

        let mut conn = self.conn.clone();
        match conn.del::<_, ()>(&keys).await {
            Ok(()) => {
                let mut index = self.index.lock();
                // Keys rewritten meanwhile keep the registration of the
                // newer write.
                for key in &keys {
                    index.remove_if_unchanged(key, mark);
                }
                debug!(?tags, removed = keys.len(), "Cache invalidated by tags");
            }
            Err(err) => self.handle_error("del", &keys.join(","), err),
        }
    }

    async fn clear(&self) {
        if !self.is_ready() {
            return;
        }

        let mark = self.index.lock().mark();
        let mut conn = self.conn.clone();
        let result: std::result::Result<(), RedisError> =
            redis::cmd("FLUSHDB").query_async(&mut conn).await;

        match result {
            Ok(()) => {
                self.index.lock().clear_until(mark);
                self.version.fetch_add(1, Ordering::AcqRel);
                info!("Redis cache CLEARED");
            }
            Err(err) => self.handle_error("flushdb", "*", err),
        }
    }

    async fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let removed = self.index.lock().purge_expired(now);
        if removed > 0 {
            debug!("Pruned {} expired keys from the local tag index", removed);
        }
        removed
    }

    async fn stats(&self) -> CacheStats {
        let size = if self.is_ready() {
            let mut conn = self.conn.clone();
            let result: std::result::Result<usize, RedisError> =
                redis::cmd("DBSIZE").query_async(&mut conn).await;
            match result {
                Ok(size) => size,
                Err(err) => {
                    self.handle_error("dbsize", "*", err);
                    0
                }
            }
        } else {
            0
        };

        CacheStats {
            size,
            tags: self.index.lock().tags.tags(),
            version: self.version.load(Ordering::Acquire),
            backend_name: REDIS_BACKEND_NAME,
        }
    }
}
