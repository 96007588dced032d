//! Folio: a multi-tenant profile gallery backend.
//!
//! Profiles and their work experiences are served over a REST surface,
//! persisted in Postgres, and fronted by a look-aside cache. Reads
//! populate the cache on miss; writes invalidate after the database
//! transaction commits. Cache failures are recovered locally and never
//! surface as request errors.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
