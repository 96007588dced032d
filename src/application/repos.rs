//! Repository traits describing persistence adapters.
//!
//! Soft-deleted rows are invisible to every read; mutations run inside
//! row-level transactions at the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::PageRequest;
use crate::domain::experiences::{ExperienceDraft, ExperienceRecord};
use crate::domain::profiles::{ProfileDraft, ProfileRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSortField {
    CreatedAt,
    UpdatedAt,
    Headline,
}

impl ProfileSortField {
    /// Column name; doubles as the cache key segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSortField::CreatedAt => "created_at",
            ProfileSortField::UpdatedAt => "updated_at",
            ProfileSortField::Headline => "headline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSort {
    pub field: ProfileSortField,
    pub direction: SortDirection,
}

impl Default for ProfileSort {
    fn default() -> Self {
        Self {
            field: ProfileSortField::UpdatedAt,
            direction: SortDirection::Desc,
        }
    }
}

/// Filters for profile listings. `search` matches headline and bio;
/// `company` matches profiles with an experience at that company.
#[derive(Debug, Clone, Default)]
pub struct ProfileQueryFilter {
    pub search: Option<String>,
    pub company: Option<String>,
}

/// Filters for experience listings, optionally scoped to one profile.
#[derive(Debug, Clone, Default)]
pub struct ExperienceQueryFilter {
    pub profile_id: Option<Uuid>,
    pub company: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateProfileParams {
    pub user_id: String,
    pub draft: ProfileDraft,
}

#[derive(Debug, Clone)]
pub struct UpdateProfileParams {
    pub id: Uuid,
    pub draft: ProfileDraft,
}

#[derive(Debug, Clone)]
pub struct CreateExperienceParams {
    pub profile_id: Uuid,
    pub draft: ExperienceDraft,
}

#[derive(Debug, Clone)]
pub struct UpdateExperienceParams {
    pub id: Uuid,
    pub draft: ExperienceDraft,
}

#[async_trait]
pub trait ProfilesRepo: Send + Sync {
    async fn create_profile(&self, params: CreateProfileParams)
        -> Result<ProfileRecord, RepoError>;

    async fn find_profile(&self, id: Uuid) -> Result<Option<ProfileRecord>, RepoError>;

    async fn list_profiles(
        &self,
        filter: &ProfileQueryFilter,
        sort: ProfileSort,
        page: PageRequest,
    ) -> Result<Vec<ProfileRecord>, RepoError>;

    async fn count_profiles(&self, filter: &ProfileQueryFilter) -> Result<u64, RepoError>;

    /// Fails with [`RepoError::NotFound`] when the row is absent or
    /// already soft-deleted.
    async fn update_profile(&self, params: UpdateProfileParams)
        -> Result<ProfileRecord, RepoError>;

    /// Soft-deletes the profile and, in the same transaction, its
    /// experiences. Returns the ids of the cascaded experiences.
    async fn soft_delete_profile(&self, id: Uuid) -> Result<Vec<Uuid>, RepoError>;
}

#[async_trait]
pub trait ExperiencesRepo: Send + Sync {
    async fn create_experience(
        &self,
        params: CreateExperienceParams,
    ) -> Result<ExperienceRecord, RepoError>;

    async fn find_experience(&self, id: Uuid) -> Result<Option<ExperienceRecord>, RepoError>;

    async fn list_experiences(
        &self,
        filter: &ExperienceQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<ExperienceRecord>, RepoError>;

    async fn count_experiences(&self, filter: &ExperienceQueryFilter) -> Result<u64, RepoError>;

    async fn update_experience(
        &self,
        params: UpdateExperienceParams,
    ) -> Result<ExperienceRecord, RepoError>;

    async fn soft_delete_experience(&self, id: Uuid) -> Result<(), RepoError>;
}
