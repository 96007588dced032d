//! Cache storage adapters.
//!
//! `CacheStore` is the narrow contract the cache service needs from a
//! key/value store: TTL-bound get/set, single and bulk delete, and a
//! pattern scan. Expiry is the store's responsibility; the TTL passed
//! to `set` is advisory. Every operation is fallible and callers decide
//! whether a failure is fatal.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

const SCAN_BATCH: usize = 200;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(String),
    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache payload compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

impl CacheError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

/// Result of a round-trip ping against the store.
#[derive(Debug, Clone, Copy)]
pub struct StorePing {
    pub latency: Duration,
}

/// Key/value store contract. No ordering guarantee across keys.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether the key was present.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// All keys matching a glob pattern. Implementations iterate the
    /// store in bounded batches rather than one unbounded command.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<StorePing, CacheError>;

    /// Memory usage as a percentage of the store's limit, when the
    /// store reports one.
    async fn memory_used_percent(&self) -> Result<Option<f64>, CacheError>;
}

// ============================================================================
// Redis store
// ============================================================================

/// Redis-backed store for multi-instance deployments.
pub struct RedisStore {
    pool: deadpool_redis::Pool,
}

impl RedisStore {
    pub fn connect(url: &str, pool_size: usize, timeout: Duration) -> Result<Self, CacheError> {
        let mut config = deadpool_redis::Config::from_url(url);
        let pool_config = config.pool.get_or_insert_with(Default::default);
        pool_config.max_size = pool_size;
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        let pool = config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(CacheError::store)?;
        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool.get().await.map_err(CacheError::store)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(CacheError::store)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(CacheError::store)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(key).await.map_err(CacheError::store)?;
        Ok(removed > 0)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection().await?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        // Cursor-based iteration keeps per-call load on the store
        // bounded; the loop ends when the cursor wraps to zero.
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(CacheError::store)?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        use redis::AsyncCommands;
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        for chunk in keys.chunks(SCAN_BATCH) {
            conn.del::<_, ()>(chunk).await.map_err(CacheError::store)?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<StorePing, CacheError> {
        let mut conn = self.connection().await?;
        let start = Instant::now();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::store)?;
        if pong != "PONG" {
            return Err(CacheError::Store(format!("unexpected ping reply `{pong}`")));
        }
        Ok(StorePing {
            latency: start.elapsed(),
        })
    }

    async fn memory_used_percent(&self) -> Result<Option<f64>, CacheError> {
        let mut conn = self.connection().await?;
        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::store)?;
        Ok(parse_memory_percent(&info))
    }
}

/// Extract used/max memory from an `INFO memory` reply. Returns `None`
/// when the store has no configured limit (`maxmemory:0`).
fn parse_memory_percent(info: &str) -> Option<f64> {
    let mut used: Option<u64> = None;
    let mut max: Option<u64> = None;
    for line in info.lines() {
        if let Some(value) = line.strip_prefix("used_memory:") {
            used = value.trim().parse().ok();
        } else if let Some(value) = line.strip_prefix("maxmemory:") {
            max = value.trim().parse().ok();
        }
    }
    match (used, max) {
        (Some(used), Some(max)) if max > 0 => Some(used as f64 / max as f64 * 100.0),
        _ => None,
    }
}

// ============================================================================
// In-memory store
// ============================================================================

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process store used in local mode and tests. TTL is enforced
/// lazily on read and scan.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.value().expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let was_present = match self.entries.remove(key) {
            Some((_, entry)) => entry.expires_at > Instant::now(),
            None => false,
        };
        Ok(was_present)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.value().expires_at > now)
            .map(|entry| entry.key().clone())
            .filter(|key| glob_matches(pattern, key))
            .collect())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<StorePing, CacheError> {
        Ok(StorePing {
            latency: Duration::ZERO,
        })
    }

    async fn memory_used_percent(&self) -> Result<Option<f64>, CacheError> {
        Ok(None)
    }
}

/// Minimal glob matcher: `*` matches any run of characters. The only
/// metacharacter our key patterns use.
fn glob_matches(pattern: &str, key: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == key;
    }

    let mut remainder = key;
    for (index, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if index == 0 {
            match remainder.strip_prefix(segment) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if index == segments.len() - 1 {
            return remainder.ends_with(segment);
        } else {
            match remainder.find(segment) {
                Some(pos) => remainder = &remainder[pos + segment.len()..],
                None => return false,
            }
        }
    }

    // Pattern ended with `*`, or all literal segments matched.
    segments.last().is_some_and(|s| s.is_empty()) || remainder.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matching() {
        assert!(glob_matches("folio:*", "folio:v:profiles:1"));
        assert!(glob_matches("*:profiles:*", "folio:v:profiles:1"));
        assert!(glob_matches("folio:t:profiles:list:*", "folio:t:profiles:list:abc"));
        assert!(glob_matches("exact", "exact"));
        assert!(!glob_matches("exact", "exact-not"));
        assert!(!glob_matches("folio:*", "other:v:profiles:1"));
        assert!(!glob_matches("*suffix", "has-other-ending"));
        assert!(glob_matches("*suffix", "ends-with-suffix"));
    }

    #[test]
    fn parse_memory_percent_reads_info_reply() {
        let info = "# Memory\r\nused_memory:50\r\nmaxmemory:200\r\n";
        assert_eq!(parse_memory_percent(info), Some(25.0));

        let unlimited = "used_memory:50\r\nmaxmemory:0\r\n";
        assert_eq!(parse_memory_percent(unlimited), None);
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store
            .set("a", b"hello".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(b"hello".to_vec()));
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_expires_entries() {
        let store = MemoryStore::new();
        store
            .set("a", b"x".to_vec(), Duration::from_millis(5))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(store.scan("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_scan_and_bulk_delete() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set("ns:v:1", b"a".to_vec(), ttl).await.unwrap();
        store.set("ns:v:2", b"b".to_vec(), ttl).await.unwrap();
        store.set("other:v:3", b"c".to_vec(), ttl).await.unwrap();

        let mut keys = store.scan("ns:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["ns:v:1".to_string(), "ns:v:2".to_string()]);

        store.delete_many(&keys).await.unwrap();
        assert_eq!(store.get("ns:v:1").await.unwrap(), None);
        assert_eq!(store.get("other:v:3").await.unwrap(), Some(b"c".to_vec()));
    }
}
