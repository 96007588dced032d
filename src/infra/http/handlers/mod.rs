pub mod experiences;
pub mod health;
pub mod profiles;

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

pub(super) const ENTITY_CACHE_CONTROL: &str = "public, max-age=300";
pub(super) const LIST_CACHE_CONTROL: &str = "public, max-age=60";

/// Strong ETag derived from the row's identity and last write time.
pub(super) fn entity_etag(id: Uuid, updated_at: OffsetDateTime) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(updated_at.unix_timestamp_nanos().to_be_bytes());
    format!("\"{}\"", hex::encode(hasher.finalize()))
}

pub(super) fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|raw| raw.split(',').any(|candidate| candidate.trim() == etag))
}

pub(super) fn apply_cache_headers(response: &mut Response, etag: Option<&str>, policy: &str) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(policy) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Some(etag) = etag
        && let Ok(value) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, value);
    }
}

pub(super) fn not_modified(etag: &str, policy: &str) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    apply_cache_headers(&mut response, Some(etag), policy);
    response
}
