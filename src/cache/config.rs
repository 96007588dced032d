use std::time::Duration;

/// Cache behavior knobs, bound from the `[cache]` settings section.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix applied to every physical key.
    pub namespace: String,
    /// TTL for single-entity entries.
    pub entity_ttl: Duration,
    /// TTL for list/page entries. Much shorter than `entity_ttl`
    /// because list membership goes stale on every write.
    pub list_ttl: Duration,
    /// Serialized payloads at or above this size are compressed.
    pub compression_threshold_bytes: usize,
    /// Ping round-trips above this budget mark the store unhealthy.
    pub health_latency_budget: Duration,
    /// Store memory usage above this percentage marks it unhealthy.
    pub health_memory_limit_percent: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "folio".to_string(),
            entity_ttl: Duration::from_secs(300),
            list_ttl: Duration::from_secs(60),
            compression_threshold_bytes: 8 * 1024,
            health_latency_budget: Duration::from_millis(50),
            health_memory_limit_percent: 90.0,
        }
    }
}
