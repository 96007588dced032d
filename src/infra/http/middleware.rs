use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::auth::{AuthError, Identity};
use crate::application::error::ErrorReport;

use super::AppState;
use super::error::ApiError;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Bearer-token verification. A presented token must verify even on
/// public routes; mutations additionally require one to be present.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = extract_bearer(request.headers().get(axum::http::header::AUTHORIZATION));

    if let Some(token) = token {
        match state.identity.verify(&token).await {
            Ok(identity) => {
                request.extensions_mut().insert(identity);
            }
            Err(AuthError::Provider(message)) => {
                warn!(
                    target = "folio::http::auth",
                    error = %message,
                    "identity provider unavailable"
                );
                return ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    super::error::codes::INTERNAL,
                    "authentication temporarily unavailable",
                )
                .with_diagnostic(message)
                .into_response();
            }
            Err(AuthError::Expired) => {
                return ApiError::unauthorized("token expired").into_response();
            }
            Err(AuthError::InvalidToken) => {
                return ApiError::unauthorized("invalid token").into_response();
            }
        }
    }

    if mutates(request.method()) && request.extensions().get::<Identity>().is_none() {
        return ApiError::unauthorized("authentication required").into_response();
    }

    next.run(request).await
}

pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (key, tier) = match request.extensions().get::<Identity>() {
        Some(identity) => (identity.subject.clone(), Some(identity.tier())),
        None => (client_address(&request), None),
    };

    let decision = state.rate_limiter.allow(&key, tier);
    if !decision.allowed {
        metrics::counter!("folio_http_rate_limited_total").increment(1);
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs(), decision.limit);
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = axum::http::HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = axum::http::HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    response
}

pub async fn enforce_timeout(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let deadline = state.request_timeout;
    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ApiError::new(
            StatusCode::GATEWAY_TIMEOUT,
            super::error::codes::INTERNAL,
            "request timed out",
        )
        .with_diagnostic(format!("request exceeded {}ms", deadline.as_millis()))
        .into_response(),
    }
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let subject = request
        .extensions()
        .get::<Identity>()
        .map(|identity| identity.subject.clone());

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "folio::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                subject = subject.as_deref().unwrap_or(""),
                "request failed",
            );
        } else {
            warn!(
                target = "folio::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                subject = subject.as_deref().unwrap_or(""),
                "client request error",
            );
        }
    }

    response
}

fn mutates(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn extract_bearer(header: Option<&axum::http::HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?;
    Some(bearer.to_string())
}

fn client_address(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}
