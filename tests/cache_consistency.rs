//! Staleness-freedom checks: after a committed write, the next read
//! through the full stack observes the new state, never a cached copy
//! of the old one.

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::atomic::Ordering;
use tower::ServiceExt;

use common::{USER_TOKEN, harness};

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router call should not fail");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be JSON")
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

fn put_profile(uri: &str, headline: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {USER_TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "headline": headline }).to_string()))
        .expect("request should build")
}

async fn create_profile(router: &Router, headline: &str) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/profiles")
        .header(header::AUTHORIZATION, format!("Bearer {USER_TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "headline": headline }).to_string()))
        .expect("request should build");
    let (status, body) = send(router, request).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn entity_reads_are_served_from_cache_until_invalidated() {
    let h = harness();
    let id = create_profile(&h.router, "Original Headline").await;
    let uri = format!("/api/v1/profiles/{id}");

    let calls_before = h.repos.profile_find_calls.load(Ordering::SeqCst);
    for _ in 0..3 {
        let (status, body) = send(&h.router, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["headline"], json!("Original Headline"));
    }
    // First read populates the entry, the rest never reach the repo.
    assert_eq!(
        h.repos.profile_find_calls.load(Ordering::SeqCst),
        calls_before + 1
    );
}

#[tokio::test]
async fn update_is_visible_on_the_next_read() {
    let h = harness();
    let id = create_profile(&h.router, "Original Headline").await;
    let uri = format!("/api/v1/profiles/{id}");

    // Warm the cache with the pre-update row.
    let (status, _) = send(&h.router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&h.router, put_profile(&uri, "Updated Headline")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&h.router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["headline"], json!("Updated Headline"));
}

#[tokio::test]
async fn list_cache_is_invalidated_by_a_create() {
    let h = harness();
    create_profile(&h.router, "First Engineer").await;

    let (status, body) = send(&h.router, get("/api/v1/profiles")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(1));

    create_profile(&h.router, "Second Engineer").await;

    let (status, body) = send(&h.router, get("/api/v1/profiles")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(2));
}

#[tokio::test]
async fn list_cache_is_invalidated_by_an_update() {
    let h = harness();
    let id = create_profile(&h.router, "Original Headline").await;

    let (_, body) = send(&h.router, get("/api/v1/profiles")).await;
    assert_eq!(body["data"]["items"][0]["headline"], json!("Original Headline"));

    let uri = format!("/api/v1/profiles/{id}");
    send(&h.router, put_profile(&uri, "Updated Headline")).await;

    let (_, body) = send(&h.router, get("/api/v1/profiles")).await;
    assert_eq!(body["data"]["items"][0]["headline"], json!("Updated Headline"));
}

#[tokio::test]
async fn experience_writes_invalidate_the_parent_profile_group() {
    let h = harness();
    let profile_id = create_profile(&h.router, "Engineer").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/experiences")
        .header(header::AUTHORIZATION, format!("Bearer {USER_TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "profileId": profile_id,
                "title": "Backend Engineer",
                "company": "Acme",
                "startDate": "2020-01-15"
            })
            .to_string(),
        ))
        .expect("request should build");
    let (status, body) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::CREATED);
    let experience_id = body["data"]["id"].as_str().unwrap().to_string();

    // Warm the scoped listing, then mutate the experience.
    let list_uri = format!("/api/v1/profiles/{profile_id}/experiences");
    let (_, body) = send(&h.router, get(&list_uri)).await;
    assert_eq!(body["data"]["total"], json!(1));

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/experiences/{experience_id}"))
        .header(header::AUTHORIZATION, format!("Bearer {USER_TOKEN}"))
        .body(Body::empty())
        .expect("request should build");
    let (status, _) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&h.router, get(&list_uri)).await;
    assert_eq!(body["data"]["total"], json!(0));
}

#[tokio::test]
async fn company_filtered_profile_lists_see_new_experiences() {
    let h = harness();
    let profile_id = create_profile(&h.router, "Engineer").await;

    // Warm the filtered listing while the profile has no Acme tenure.
    let (status, body) = send(&h.router, get("/api/v1/profiles?company=Acme")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(0));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/experiences")
        .header(header::AUTHORIZATION, format!("Bearer {USER_TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "profileId": profile_id,
                "title": "Backend Engineer",
                "company": "Acme",
                "startDate": "2020-01-15"
            })
            .to_string(),
        ))
        .expect("request should build");
    let (status, _) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&h.router, get("/api/v1/profiles?company=Acme")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(1));
}

#[tokio::test]
async fn delete_leaves_no_readable_cache_entry() {
    let h = harness();
    let id = create_profile(&h.router, "Doomed").await;
    let uri = format!("/api/v1/profiles/{id}");

    // Warm the entity entry.
    send(&h.router, get(&uri)).await;

    let request = Request::builder()
        .method("DELETE")
        .uri(&uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", common::ADMIN_TOKEN))
        .body(Body::empty())
        .expect("request should build");
    let (status, _) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&h.router, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_updates_converge_on_the_stored_row() {
    let h = harness();
    let id = create_profile(&h.router, "Original Headline").await;
    let uri = format!("/api/v1/profiles/{id}");

    let first = send(&h.router, put_profile(&uri, "Headline A"));
    let second = send(&h.router, put_profile(&uri, "Headline B"));
    let ((status_a, _), (status_b, _)) = tokio::join!(first, second);
    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_b, StatusCode::OK);

    let stored = {
        let profiles = h.repos.profiles.lock().unwrap();
        profiles
            .values()
            .next()
            .expect("profile should still exist")
            .headline
            .clone()
    };

    let (status, body) = send(&h.router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["headline"], json!(stored));
}
