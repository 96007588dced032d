//! HTTP surface: router, state, middleware chain.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;

pub use rate_limit::{RateLimitTiers, TieredRateLimiter};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router, middleware as axum_middleware,
    routing::get,
};

use crate::application::auth::IdentityProvider;
use crate::application::experiences::ExperienceService;
use crate::application::profiles::ProfileService;
use crate::cache::CacheService;
use crate::infra::db::PostgresRepositories;

/// Liveness probe over the relational store. A trait seam so router
/// tests run without Postgres.
#[async_trait]
pub trait DatabasePing: Send + Sync {
    async fn ping(&self) -> Result<(), String>;
}

#[async_trait]
impl DatabasePing for PostgresRepositories {
    async fn ping(&self) -> Result<(), String> {
        self.health_check().await.map_err(|err| err.to_string())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub profiles: ProfileService,
    pub experiences: ExperienceService,
    pub cache: CacheService,
    pub identity: Arc<dyn IdentityProvider>,
    pub rate_limiter: Arc<TieredRateLimiter>,
    pub db: Arc<dyn DatabasePing>,
    pub request_timeout: Duration,
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/api/v1/profiles",
            get(handlers::profiles::list_profiles).post(handlers::profiles::create_profile),
        )
        .route(
            "/api/v1/profiles/{id}",
            get(handlers::profiles::get_profile)
                .put(handlers::profiles::update_profile)
                .delete(handlers::profiles::delete_profile),
        )
        .route(
            "/api/v1/profiles/{id}/experiences",
            get(handlers::experiences::list_profile_experiences),
        )
        .route(
            "/api/v1/experiences",
            get(handlers::experiences::list_experiences)
                .post(handlers::experiences::create_experience),
        )
        .route(
            "/api/v1/experiences/{id}",
            get(handlers::experiences::get_experience)
                .put(handlers::experiences::update_experience)
                .delete(handlers::experiences::delete_experience),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ));

    Router::new()
        .merge(api)
        .route("/health", get(handlers::health::health))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::enforce_timeout,
        ))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}
