//! Experience entity: one position within a profile's history.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::error::{DomainError, ValidationReport};

pub const TITLE_MAX_CHARS: usize = 100;
pub const COMPANY_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceRecord {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub title: String,
    pub company: String,
    pub start_date: Date,
    /// `None` means the position is current.
    pub end_date: Option<Date>,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

/// Validated input for creating or replacing an experience.
#[derive(Debug, Clone)]
pub struct ExperienceDraft {
    pub title: String,
    pub company: String,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub description: Option<String>,
}

impl ExperienceDraft {
    pub fn validate(
        title: String,
        company: String,
        start_date: Date,
        end_date: Option<Date>,
        description: Option<String>,
    ) -> Result<Self, DomainError> {
        let mut report = ValidationReport::default();

        let title = title.trim().to_string();
        check_bounded(&mut report, "title", &title, TITLE_MAX_CHARS);

        let company = company.trim().to_string();
        check_bounded(&mut report, "company", &company, COMPANY_MAX_CHARS);

        if let Some(end) = end_date {
            if end < start_date {
                report.push(
                    "end_date",
                    format!("end_date {end} precedes start_date {start_date}"),
                    "date_range",
                );
            }
        }

        let description = description.and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        });
        if let Some(description) = description.as_deref() {
            let chars = description.chars().count();
            if chars > DESCRIPTION_MAX_CHARS {
                report.push(
                    "description",
                    format!(
                        "description must be at most {DESCRIPTION_MAX_CHARS} characters, got {chars}"
                    ),
                    "length",
                );
            }
        }

        report.finish()?;

        Ok(Self {
            title,
            company,
            start_date,
            end_date,
            description,
        })
    }
}

fn check_bounded(report: &mut ValidationReport, field: &'static str, value: &str, max: usize) {
    let chars = value.chars().count();
    if chars == 0 {
        report.push(field, format!("{field} must not be empty"), "length");
    } else if chars > max {
        report.push(
            field,
            format!("{field} must be at most {max} characters, got {chars}"),
            "length",
        );
    }
}
