use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;
use crate::application::experiences::ExperienceError;
use crate::application::profiles::ProfileError;
use crate::application::repos::RepoError;
use crate::domain::error::{DomainError, ValidationIssue};

use super::models::Envelope;

pub mod codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const CONFLICT: &str = "CONFLICT";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const INTERNAL: &str = "INTERNAL";
}

/// API-surface error. The body carries a stable code and a public
/// message; the diagnostic detail travels on the response extensions
/// for the logging middleware only.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Vec<ValidationIssue>,
    diagnostic: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Vec::new(),
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, message)
    }

    pub fn forbidden() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            codes::FORBIDDEN,
            "insufficient permissions",
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: codes::VALIDATION_ERROR,
            message: "validation failed".to_string(),
            details: issues,
            diagnostic: None,
        }
    }

    pub fn internal(diagnostic: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            "internal error",
        )
        .with_diagnostic(diagnostic)
    }

    pub fn rate_limited(retry_after: u64, limit: u32) -> Response {
        let envelope = Envelope::<()>::failure(
            codes::RATE_LIMITED,
            "rate limit exceeded".to_string(),
            Vec::new(),
        );
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(envelope)).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
            headers.insert(axum::http::header::RETRY_AFTER, value);
        }
        if let Ok(value) = axum::http::HeaderValue::from_str(&limit.to_string()) {
            headers.insert("x-ratelimit-limit", value);
        }
        headers.insert(
            "x-ratelimit-remaining",
            axum::http::HeaderValue::from_static("0"),
        );
        ErrorReport::from_message(
            "infra::http::rate_limit",
            StatusCode::TOO_MANY_REQUESTS,
            format!("rate_limited: retry_after={retry_after}"),
        )
        .attach(&mut response);
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let diagnostic = self
            .diagnostic
            .unwrap_or_else(|| format!("{}: {}", self.code, self.message));
        let envelope = Envelope::<()>::failure(self.code, self.message, self.details);
        let mut response = (self.status, Json(envelope)).into_response();
        ErrorReport::from_message("infra::http", self.status, diagnostic).attach(&mut response);
        response
    }
}

impl From<ProfileError> for ApiError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::NotFound => ApiError::not_found("profile not found"),
            ProfileError::Forbidden => ApiError::forbidden(),
            ProfileError::Domain(domain) => domain.into(),
            ProfileError::Repo(repo) => repo.into(),
        }
    }
}

impl From<ExperienceError> for ApiError {
    fn from(err: ExperienceError) -> Self {
        match err {
            ExperienceError::NotFound => ApiError::not_found("experience not found"),
            ExperienceError::ProfileNotFound => ApiError::not_found("profile not found"),
            ExperienceError::Forbidden => ApiError::forbidden(),
            ExperienceError::Domain(domain) => domain.into(),
            ExperienceError::Repo(repo) => repo.into(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { issues } => ApiError::validation(issues),
            DomainError::NotFound { entity } => {
                ApiError::not_found(format!("{entity} not found"))
            }
            DomainError::Invariant { message } => ApiError::internal(message),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ApiError::not_found("resource not found"),
            RepoError::Duplicate { constraint } => ApiError::new(
                StatusCode::CONFLICT,
                codes::CONFLICT,
                "duplicate record",
            )
            .with_diagnostic(format!("unique constraint {constraint}")),
            RepoError::InvalidInput { message } => ApiError::bad_request(message),
            RepoError::Integrity { message } => {
                ApiError::new(StatusCode::CONFLICT, codes::CONFLICT, "integrity violation")
                    .with_diagnostic(message)
            }
            RepoError::Timeout => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::INTERNAL,
                "database timeout",
            ),
            RepoError::Persistence(message) => ApiError::internal(message),
        }
    }
}
