use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::warn;

use super::super::AppState;
use super::super::models::{ComponentHealth, Envelope, HealthResponse};

/// Public liveness endpoint covering the database and the cache. A
/// degraded cache does not fail the check; requests keep working
/// against the database.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_start = Instant::now();
    let database = match state.db.ping().await {
        Ok(()) => ComponentHealth {
            healthy: true,
            latency_ms: Some(db_start.elapsed().as_millis() as u64),
            memory_used_percent: None,
        },
        Err(message) => {
            warn!(target = "folio::http::health", error = %message, "database ping failed");
            ComponentHealth {
                healthy: false,
                latency_ms: None,
                memory_used_percent: None,
            }
        }
    };

    let cache = match state.cache.health_check().await {
        Ok(health) => {
            metrics::gauge!("folio_cache_memory_used_percent")
                .set(health.memory_used_percent.unwrap_or(0.0));
            ComponentHealth {
                healthy: health.healthy,
                latency_ms: Some(health.latency_ms as u64),
                memory_used_percent: health.memory_used_percent,
            }
        }
        Err(err) => {
            warn!(target = "folio::http::health", error = %err, "cache ping failed");
            ComponentHealth {
                healthy: false,
                latency_ms: None,
                memory_used_percent: None,
            }
        }
    };

    let status = if database.healthy { "ok" } else { "degraded" };
    let code = if database.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(Envelope::success(HealthResponse {
            status,
            database,
            cache,
        })),
    )
}
