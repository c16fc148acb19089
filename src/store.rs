//! External counter store used by the rate limiter.
//!
//! The limiter only needs three operations with Redis semantics: read a
//! counter, set it with an expiry, and atomically increment it.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use redis::RedisError;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::StoreError;

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Round trip used once at startup to decide whether limiting is enabled.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError>;

    /// Atomic increment; a missing key counts from zero. Returns the new value.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;
}

/// Redis backed store.
///
/// The connection manager re-establishes the connection after a drop, so a
/// Redis restart costs the in-flight calls but not the rest of the process.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await.map_err(classify)?;
        Ok(Self { conn })
    }
}

// Lost or refused connections are outages, everything else is a command error
fn classify(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Redis(e)
    }
}

// Redis expiry has whole-second resolution
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(classify)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.get(key).await.map_err(classify)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs(ttl)).await.map_err(classify)?;
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, 1).await.map_err(classify)?;
        Ok(value)
    }
}

// Counter with optional expiry deadline
struct MemoryEntry {
    value: i64,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process store with the same TTL semantics as Redis.
///
/// Expired keys are dropped lazily on access. Uses tokio's clock so tests
/// can pause and advance time.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(self.entries.get(key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(MemoryEntry {
                value: 0,
                expires_at: None,
            });

        // INCR on an expired key behaves like INCR on a missing one
        if entry.is_expired(now) {
            entry.value = 0;
            entry.expires_at = None;
        }
        entry.value += 1;
        Ok(entry.value)
    }
}
