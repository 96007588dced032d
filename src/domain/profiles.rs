//! Profile entity and its validation rules.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use super::error::{DomainError, ValidationReport};

pub const HEADLINE_MIN_CHARS: usize = 3;
pub const HEADLINE_MAX_CHARS: usize = 100;
pub const BIO_MAX_CHARS: usize = 2000;

/// Optional outbound links, each a validated absolute URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub website: Option<String>,
}

impl SocialLinks {
    pub fn is_empty(&self) -> bool {
        self.linkedin.is_none() && self.github.is_none() && self.website.is_none()
    }
}

/// A profile row. `deleted_at` marks soft deletion; deleted rows are
/// invisible to every read path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: Uuid,
    pub user_id: String,
    pub headline: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub social_links: SocialLinks,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

/// Validated input for creating or replacing a profile.
#[derive(Debug, Clone)]
pub struct ProfileDraft {
    pub headline: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub social_links: SocialLinks,
}

impl ProfileDraft {
    /// Normalize and validate raw input, reporting every failing field.
    pub fn validate(
        headline: String,
        bio: Option<String>,
        avatar_url: Option<String>,
        social_links: SocialLinks,
    ) -> Result<Self, DomainError> {
        let mut report = ValidationReport::default();

        let headline = headline.trim().to_string();
        let headline_chars = headline.chars().count();
        if !(HEADLINE_MIN_CHARS..=HEADLINE_MAX_CHARS).contains(&headline_chars) {
            report.push(
                "headline",
                format!(
                    "headline must be between {HEADLINE_MIN_CHARS} and {HEADLINE_MAX_CHARS} characters, got {headline_chars}"
                ),
                "length",
            );
        }

        let bio = normalize_optional(bio);
        if let Some(bio) = bio.as_deref() {
            let chars = bio.chars().count();
            if chars > BIO_MAX_CHARS {
                report.push(
                    "bio",
                    format!("bio must be at most {BIO_MAX_CHARS} characters, got {chars}"),
                    "length",
                );
            }
        }

        let avatar_url = normalize_optional(avatar_url);
        if let Some(raw) = avatar_url.as_deref() {
            check_url(&mut report, "avatar_url", raw);
        }

        let social_links = SocialLinks {
            linkedin: normalize_optional(social_links.linkedin),
            github: normalize_optional(social_links.github),
            website: normalize_optional(social_links.website),
        };
        if let Some(raw) = social_links.linkedin.as_deref() {
            check_url(&mut report, "social_links.linkedin", raw);
        }
        if let Some(raw) = social_links.github.as_deref() {
            check_url(&mut report, "social_links.github", raw);
        }
        if let Some(raw) = social_links.website.as_deref() {
            check_url(&mut report, "social_links.website", raw);
        }

        report.finish()?;

        Ok(Self {
            headline,
            bio,
            avatar_url,
            social_links,
        })
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn check_url(report: &mut ValidationReport, field: &'static str, raw: &str) {
    match Url::parse(raw) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => report.push(
            field,
            format!("unsupported URL scheme `{}`", url.scheme()),
            "url",
        ),
        Err(err) => report.push(field, format!("invalid URL: {err}"), "url"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::DomainError;

    fn draft(headline: &str) -> Result<ProfileDraft, DomainError> {
        ProfileDraft::validate(headline.to_string(), None, None, SocialLinks::default())
    }

    #[test]
    fn headline_of_three_chars_is_accepted() {
        let draft = draft("abc").expect("minimum length headline");
        assert_eq!(draft.headline, "abc");
    }

    #[test]
    fn headline_of_two_chars_is_rejected_naming_the_field() {
        let err = draft("ab").expect_err("too short");
        match err {
            DomainError::Validation { issues } => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].field, "headline");
                assert_eq!(issues[0].constraint, "length");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn headline_is_trimmed_before_length_check() {
        // "  ab  " trims to two characters and must fail.
        assert!(draft("  ab  ").is_err());
        assert!(draft("  abc  ").is_ok());
    }

    #[test]
    fn oversized_bio_is_rejected() {
        let bio = "x".repeat(BIO_MAX_CHARS + 1);
        let err = ProfileDraft::validate(
            "valid headline".to_string(),
            Some(bio),
            None,
            SocialLinks::default(),
        )
        .expect_err("bio too long");
        match err {
            DomainError::Validation { issues } => assert_eq!(issues[0].field, "bio"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_social_link_is_rejected() {
        let links = SocialLinks {
            linkedin: Some("not a url".to_string()),
            github: Some("https://github.com/someone".to_string()),
            website: None,
        };
        let err = ProfileDraft::validate("valid headline".to_string(), None, None, links)
            .expect_err("bad linkedin url");
        match err {
            DomainError::Validation { issues } => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].field, "social_links.linkedin");
                assert_eq!(issues[0].constraint, "url");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let err = ProfileDraft::validate(
            "valid headline".to_string(),
            None,
            Some("ftp://example.com/avatar.png".to_string()),
            SocialLinks::default(),
        )
        .expect_err("ftp scheme");
        match err {
            DomainError::Validation { issues } => assert_eq!(issues[0].field, "avatar_url"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn multiple_failures_are_reported_together() {
        let links = SocialLinks {
            linkedin: Some("nope".to_string()),
            github: None,
            website: None,
        };
        let err = ProfileDraft::validate("ab".to_string(), None, None, links)
            .expect_err("two failing fields");
        match err {
            DomainError::Validation { issues } => assert_eq!(issues.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
