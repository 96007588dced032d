//! Typed cache-aside service over a [`CacheStore`].
//!
//! Every logical entry is two physical keys: the serialized value and a
//! small metadata record (creation/expiry, compression flag, byte size,
//! tags). Splitting them lets TTL and compression be inspected without
//! deserializing the payload. Tag membership is kept as marker keys
//! under the tag's prefix so a whole group can be invalidated with one
//! bounded scan instead of sweeping the entire namespace.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::store::{CacheError, CacheStore};

const SOURCE: &str = "cache::service";

/// Per-entry metadata, stored beside the value under its own key.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub(crate) struct CacheMetadata {
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub compressed: bool,
    pub size_bytes: usize,
    pub tags: Vec<String>,
}

/// Options for [`CacheService::set`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Entry TTL; defaults to the configured entity TTL.
    pub ttl: Option<Duration>,
    /// Compress payloads at or above the configured threshold.
    pub compress: bool,
    /// Tags registering this entry for group invalidation.
    pub tags: Vec<String>,
}

impl SetOptions {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn compress(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Outcome of a cache health probe. Operational visibility only; never
/// used to gate requests.
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub healthy: bool,
    pub latency_ms: u128,
    pub memory_used_percent: Option<f64>,
}

#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl CacheService {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn value_key(&self, key: &str) -> String {
        format!("{}:v:{key}", self.config.namespace)
    }

    fn metadata_key(&self, key: &str) -> String {
        format!("{}:m:{key}", self.config.namespace)
    }

    fn tag_marker_key(&self, tag: &str, key: &str) -> String {
        format!("{}:t:{tag}:{key}", self.config.namespace)
    }

    fn tag_marker_prefix(&self, tag: &str) -> String {
        format!("{}:t:{tag}:", self.config.namespace)
    }

    /// Serialize and store a value with matching metadata. Failures
    /// propagate; partially written state is cleaned up on a best-effort
    /// basis only (the next read treats a half-entry as a miss).
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<(), CacheError> {
        let serialized = serde_json::to_vec(value)?;
        let compress = options.compress && serialized.len() >= self.config.compression_threshold_bytes;
        let payload = if compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&serialized)?;
            encoder.finish()?
        } else {
            serialized
        };

        let ttl = options.ttl.unwrap_or(self.config.entity_ttl);
        let now = OffsetDateTime::now_utc();
        let metadata = CacheMetadata {
            created_at: now,
            expires_at: now + ttl,
            compressed: compress,
            size_bytes: payload.len(),
            tags: options.tags.clone(),
        };
        let metadata_bytes = serde_json::to_vec(&metadata)?;

        self.store
            .set(&self.metadata_key(key), metadata_bytes, ttl)
            .await?;
        self.store.set(&self.value_key(key), payload, ttl).await?;

        // Tag markers share the entry's TTL so group membership never
        // outlives the entry itself.
        for tag in &options.tags {
            self.store
                .set(&self.tag_marker_key(tag, key), vec![1], ttl)
                .await?;
        }

        counter!("folio_cache_set_total").increment(1);
        Ok(())
    }

    /// Fetch and deserialize an entry. `Ok(None)` is a miss; `Err` is a
    /// store failure the caller should log at a higher severity before
    /// falling back to the source of truth. A corrupted entry counts as
    /// a miss: it is logged, dropped, and repopulated by the caller.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let value_key = self.value_key(key);
        let metadata_key = self.metadata_key(key);
        let (value, metadata) =
            tokio::join!(self.store.get(&value_key), self.store.get(&metadata_key));
        let (value, metadata) = (value?, metadata?);

        let (Some(value), Some(metadata)) = (value, metadata) else {
            counter!("folio_cache_miss_total").increment(1);
            debug!(target = "folio::cache", key, "cache miss");
            return Ok(None);
        };

        let metadata: CacheMetadata = match serde_json::from_slice(&metadata) {
            Ok(metadata) => metadata,
            Err(err) => {
                self.discard_corrupt(key, "metadata", &err).await;
                return Ok(None);
            }
        };

        let raw = if metadata.compressed {
            let mut decoder = GzDecoder::new(value.as_slice());
            let mut decompressed = Vec::new();
            match decoder.read_to_end(&mut decompressed) {
                Ok(_) => decompressed,
                Err(err) => {
                    self.discard_corrupt(key, "payload", &err).await;
                    return Ok(None);
                }
            }
        } else {
            value
        };

        match serde_json::from_slice(&raw) {
            Ok(decoded) => {
                counter!("folio_cache_hit_total").increment(1);
                Ok(Some(decoded))
            }
            Err(err) => {
                self.discard_corrupt(key, "value", &err).await;
                Ok(None)
            }
        }
    }

    async fn discard_corrupt(
        &self,
        key: &str,
        part: &'static str,
        err: &(dyn std::error::Error + Send + Sync),
    ) {
        counter!("folio_cache_corrupt_total").increment(1);
        warn!(
            target = "folio::cache",
            source = SOURCE,
            key,
            part,
            error = %err,
            "corrupted cache entry treated as miss"
        );
        if let Err(err) = self.delete(key).await {
            warn!(
                target = "folio::cache",
                key,
                error = %err,
                "failed to drop corrupted entry"
            );
        }
    }

    /// Remove an entry and its tag markers. Returns whether the value
    /// key existed.
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        // Metadata carries the tag list, so read it before deleting.
        let tags = match self.store.get(&self.metadata_key(key)).await {
            Ok(Some(bytes)) => serde_json::from_slice::<CacheMetadata>(&bytes)
                .map(|metadata| metadata.tags)
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        let was_present = self.store.delete(&self.value_key(key)).await?;
        self.store.delete(&self.metadata_key(key)).await?;

        let markers: Vec<String> = tags
            .iter()
            .map(|tag| self.tag_marker_key(tag, key))
            .collect();
        if !markers.is_empty() {
            // Best effort: a stale marker only means one extra delete
            // during the next tag sweep.
            if let Err(err) = self.store.delete_many(&markers).await {
                warn!(
                    target = "folio::cache",
                    key,
                    error = %err,
                    "failed to remove tag markers"
                );
            }
        }

        Ok(was_present)
    }

    /// Delete every entry registered under a tag, plus the markers
    /// themselves. Returns the number of logical entries removed.
    pub async fn invalidate_tag(&self, tag: &str) -> Result<usize, CacheError> {
        let prefix = self.tag_marker_prefix(tag);
        let markers = self.store.scan(&format!("{prefix}*")).await?;

        let mut doomed = Vec::with_capacity(markers.len() * 3);
        let mut entries = 0usize;
        for marker in &markers {
            if let Some(logical) = marker.strip_prefix(&prefix) {
                doomed.push(self.value_key(logical));
                doomed.push(self.metadata_key(logical));
                entries += 1;
            }
            doomed.push(marker.clone());
        }

        self.store.delete_many(&doomed).await?;
        counter!("folio_cache_invalidation_total", "scope" => "tag").increment(entries as u64);
        Ok(entries)
    }

    /// Bulk-delete everything under this service's namespace.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let pattern = format!("{}:*", self.config.namespace);
        let keys = self.store.scan(&pattern).await?;
        let count = keys.len();
        self.store.delete_many(&keys).await?;
        counter!("folio_cache_invalidation_total", "scope" => "clear").increment(count as u64);
        Ok(count)
    }

    /// Ping round-trip plus store memory stats.
    pub async fn health_check(&self) -> Result<CacheHealth, CacheError> {
        let ping = self.store.ping().await?;
        let memory_used_percent = self.store.memory_used_percent().await?;

        let memory_ok = memory_used_percent
            .map(|percent| percent < self.config.health_memory_limit_percent)
            .unwrap_or(true);
        let healthy = ping.latency <= self.config.health_latency_budget && memory_ok;

        Ok(CacheHealth {
            healthy,
            latency_ms: ping.latency.as_millis(),
            memory_used_percent,
        })
    }
}
