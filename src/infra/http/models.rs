//! Wire DTOs. Field names are camelCase on the wire; internal records
//! stay snake_case.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::application::pagination::Page;
use crate::domain::error::ValidationIssue;
use crate::domain::experiences::ExperienceRecord;
use crate::domain::profiles::{ProfileRecord, SocialLinks};

fn wire_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ValidationIssue>,
}

/// The uniform response envelope. Absent sides serialize as explicit
/// `null` so clients can key on field presence.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
    pub timestamp: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: wire_timestamp(),
        }
    }
}

impl Envelope<()> {
    /// Success with no payload (deletes).
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            timestamp: wire_timestamp(),
        }
    }
}

impl<T> Envelope<T> {
    pub fn failure(code: &str, message: String, details: Vec<ValidationIssue>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message,
                details,
            }),
            timestamp: wire_timestamp(),
        }
    }
}

/// List payload inside the envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListData<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: Uuid,
    pub user_id: String,
    pub headline: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub social_links: SocialLinks,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<ProfileRecord> for ProfileResponse {
    fn from(record: ProfileRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            headline: record.headline,
            bio: record.bio,
            avatar_url: record.avatar_url,
            social_links: record.social_links,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceResponse {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub title: String,
    pub company: String,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<ExperienceRecord> for ExperienceResponse {
    fn from(record: ExperienceRecord) -> Self {
        Self {
            id: record.id,
            profile_id: record.profile_id,
            title: record.title,
            company: record.company,
            start_date: record.start_date,
            end_date: record.end_date,
            description: record.description,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

pub fn list_data<R, W: From<R>>(page: Page<R>) -> ListData<W> {
    ListData {
        items: page.items.into_iter().map(W::from).collect(),
        page: page.page,
        page_size: page.page_size,
        total: page.total,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBodyRequest {
    pub headline: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub social_links: SocialLinks,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceCreateRequest {
    pub profile_id: Uuid,
    #[serde(flatten)]
    pub body: ExperienceBodyRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceBodyRequest {
    pub title: String,
    pub company: String,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: ComponentHealth,
    pub cache: ComponentHealth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used_percent: Option<f64>,
}
