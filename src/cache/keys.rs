//! Cache key construction.
//!
//! List keys must deterministically encode every input that shapes the
//! result set, so identical queries share an entry and different
//! queries never collide. Free-text filters are hashed into the key
//! rather than embedded raw.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use uuid::Uuid;

/// Logical key for a single profile.
pub fn profile_key(id: Uuid) -> String {
    format!("profiles:{id}")
}

/// Logical key for a single experience.
pub fn experience_key(id: Uuid) -> String {
    format!("experiences:{id}")
}

/// Logical key for one page of a profile listing.
pub fn profile_list_key(
    page: u32,
    page_size: u32,
    sort: &str,
    order: &str,
    search: Option<&str>,
    company: Option<&str>,
) -> String {
    let filter_hash = hash_filters(&[search, company]);
    format!("profiles:list:{page}:{page_size}:{sort}:{order}:{filter_hash:016x}")
}

/// Logical key for one page of an experience listing, optionally
/// scoped to a single profile.
pub fn experience_list_key(
    profile_id: Option<Uuid>,
    page: u32,
    page_size: u32,
    company: Option<&str>,
    search: Option<&str>,
) -> String {
    let scope = profile_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "all".to_string());
    let filter_hash = hash_filters(&[company, search]);
    format!("experiences:list:{scope}:{page}:{page_size}:{filter_hash:016x}")
}

fn hash_filters(filters: &[Option<&str>]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for filter in filters {
        filter.hash(&mut hasher);
    }
    hasher.finish()
}

/// Tag names used for group invalidation.
pub mod tags {
    use uuid::Uuid;

    /// Every cached profile list page.
    pub const PROFILE_LISTS: &str = "profiles:list";

    /// Every cached experience list page.
    pub const EXPERIENCE_LISTS: &str = "experiences:list";

    /// Entries that depend on one profile: the profile itself and its
    /// experience list pages. Invalidated on cascade delete.
    pub fn profile_group(id: Uuid) -> String {
        format!("profile:{id}")
    }
}
