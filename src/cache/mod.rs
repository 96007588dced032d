//! Folio cache system.
//!
//! Look-aside caching for profiles, experiences, and their list pages:
//!
//! - **Store adapter**: a key/value store with TTL, namespacing, and
//!   pattern scans. Redis in multi-instance deployments, an in-process
//!   map in local mode and tests.
//! - **Cache service**: typed get/set/delete over the adapter with a
//!   metadata record per entry and tag-indexed group invalidation.
//!
//! The application populates the cache on read-miss and invalidates it
//! after the database transaction commits. Store failures are logged
//! and recovered; they never fail a request.

mod config;
pub mod keys;
mod service;
mod store;

pub use config::CacheConfig;
pub use keys::tags;
pub use service::{CacheHealth, CacheService, SetOptions};
pub use store::{CacheError, CacheStore, MemoryStore, RedisStore, StorePing};
