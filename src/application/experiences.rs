//! Experience operations with look-aside caching.
//!
//! Same contract as the profile service: populate on read miss,
//! invalidate after commit, swallow cache failures. Experiences belong
//! to a profile, so ownership checks go through the parent row.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use time::Date;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::auth::Identity;
use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    CreateExperienceParams, ExperienceQueryFilter, ExperiencesRepo, ProfilesRepo, RepoError,
    UpdateExperienceParams,
};
use crate::cache::{CacheService, SetOptions, keys, tags};
use crate::domain::error::DomainError;
use crate::domain::experiences::{ExperienceDraft, ExperienceRecord};

#[derive(Debug, Error)]
pub enum ExperienceError {
    #[error("experience not found")]
    NotFound,
    #[error("profile not found")]
    ProfileNotFound,
    #[error("operation not permitted for this identity")]
    Forbidden,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for ExperienceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ExperienceError::NotFound,
            other => ExperienceError::Repo(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExperienceInput {
    pub title: String,
    pub company: String,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub description: Option<String>,
}

impl ExperienceInput {
    fn into_draft(self) -> Result<ExperienceDraft, DomainError> {
        ExperienceDraft::validate(
            self.title,
            self.company,
            self.start_date,
            self.end_date,
            self.description,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExperienceListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub profile_id: Option<Uuid>,
    pub company: Option<String>,
    pub search: Option<String>,
}

#[derive(Clone)]
pub struct ExperienceService {
    repo: Arc<dyn ExperiencesRepo>,
    profiles: Arc<dyn ProfilesRepo>,
    cache: CacheService,
}

impl ExperienceService {
    pub fn new(
        repo: Arc<dyn ExperiencesRepo>,
        profiles: Arc<dyn ProfilesRepo>,
        cache: CacheService,
    ) -> Self {
        Self {
            repo,
            profiles,
            cache,
        }
    }

    /// Requires a live parent profile the caller is allowed to manage.
    pub async fn create(
        &self,
        identity: &Identity,
        profile_id: Uuid,
        input: ExperienceInput,
    ) -> Result<ExperienceRecord, ExperienceError> {
        let parent = self
            .profiles
            .find_profile(profile_id)
            .await?
            .ok_or(ExperienceError::ProfileNotFound)?;
        if !identity.can_manage(&parent.user_id) {
            return Err(ExperienceError::Forbidden);
        }

        let draft = input.into_draft()?;
        let experience = self
            .repo
            .create_experience(CreateExperienceParams { profile_id, draft })
            .await?;

        // Company-filtered profile listings match against experience
        // rows, so experience writes purge profile lists too.
        self.invalidate(
            &[],
            &[
                tags::EXPERIENCE_LISTS.to_string(),
                tags::PROFILE_LISTS.to_string(),
                tags::profile_group(profile_id),
            ],
        )
        .await;

        Ok(experience)
    }

    pub async fn get(&self, id: Uuid) -> Result<ExperienceRecord, ExperienceError> {
        let key = keys::experience_key(id);
        match self.cache.get::<ExperienceRecord>(&key).await {
            Ok(Some(experience)) => return Ok(experience),
            Ok(None) => {}
            Err(err) => {
                counter!("folio_cache_read_error_total").increment(1);
                error!(
                    target = "folio::experiences",
                    %id,
                    error = %err,
                    "cache read failed; falling back to database"
                );
            }
        }

        let experience = self
            .repo
            .find_experience(id)
            .await?
            .ok_or(ExperienceError::NotFound)?;

        let options = SetOptions::default()
            .ttl(self.cache.config().entity_ttl)
            .compress()
            .tag(tags::profile_group(experience.profile_id));
        if let Err(err) = self.cache.set(&key, &experience, options).await {
            warn!(target = "folio::experiences", %id, error = %err, "failed to populate cache");
        }

        Ok(experience)
    }

    pub async fn list(
        &self,
        query: ExperienceListQuery,
    ) -> Result<Page<ExperienceRecord>, ExperienceError> {
        let request = PageRequest::new(query.page, query.page_size);
        let filter = ExperienceQueryFilter {
            profile_id: query.profile_id,
            company: query.company,
            search: query.search,
        };
        let key = keys::experience_list_key(
            filter.profile_id,
            request.page(),
            request.page_size(),
            filter.company.as_deref(),
            filter.search.as_deref(),
        );

        match self.cache.get::<Page<ExperienceRecord>>(&key).await {
            Ok(Some(page)) => return Ok(page),
            Ok(None) => {}
            Err(err) => {
                counter!("folio_cache_read_error_total").increment(1);
                error!(
                    target = "folio::experiences",
                    error = %err,
                    "list cache read failed; falling back to database"
                );
            }
        }

        let items = self.repo.list_experiences(&filter, request).await?;
        let total = self.repo.count_experiences(&filter).await?;
        let page = Page::new(items, request, total);

        let mut options = SetOptions::default()
            .ttl(self.cache.config().list_ttl)
            .compress()
            .tag(tags::EXPERIENCE_LISTS);
        if let Some(profile_id) = filter.profile_id {
            options = options.tag(tags::profile_group(profile_id));
        }
        if let Err(err) = self.cache.set(&key, &page, options).await {
            warn!(target = "folio::experiences", error = %err, "failed to populate list cache");
        }

        Ok(page)
    }

    pub async fn update(
        &self,
        identity: &Identity,
        id: Uuid,
        input: ExperienceInput,
    ) -> Result<ExperienceRecord, ExperienceError> {
        let existing = self
            .repo
            .find_experience(id)
            .await?
            .ok_or(ExperienceError::NotFound)?;
        self.authorize(identity, existing.profile_id).await?;

        let draft = input.into_draft()?;
        let updated = self
            .repo
            .update_experience(UpdateExperienceParams { id, draft })
            .await?;

        self.invalidate(
            &[keys::experience_key(id)],
            &[
                tags::EXPERIENCE_LISTS.to_string(),
                tags::PROFILE_LISTS.to_string(),
                tags::profile_group(existing.profile_id),
            ],
        )
        .await;

        Ok(updated)
    }

    pub async fn delete(&self, identity: &Identity, id: Uuid) -> Result<(), ExperienceError> {
        let existing = self
            .repo
            .find_experience(id)
            .await?
            .ok_or(ExperienceError::NotFound)?;
        self.authorize(identity, existing.profile_id).await?;

        self.repo.soft_delete_experience(id).await?;

        self.invalidate(
            &[keys::experience_key(id)],
            &[
                tags::EXPERIENCE_LISTS.to_string(),
                tags::PROFILE_LISTS.to_string(),
                tags::profile_group(existing.profile_id),
            ],
        )
        .await;

        Ok(())
    }

    /// Ownership follows the parent profile. A missing parent means the
    /// profile was deleted out from under the experience; treat it as
    /// not found rather than leaking an orphan.
    async fn authorize(&self, identity: &Identity, profile_id: Uuid) -> Result<(), ExperienceError> {
        let parent = self
            .profiles
            .find_profile(profile_id)
            .await?
            .ok_or(ExperienceError::NotFound)?;
        if identity.can_manage(&parent.user_id) {
            Ok(())
        } else {
            Err(ExperienceError::Forbidden)
        }
    }

    async fn invalidate(&self, entity_keys: &[String], tag_names: &[String]) {
        for key in entity_keys {
            if let Err(err) = self.cache.delete(key).await {
                counter!("folio_cache_invalidation_error_total").increment(1);
                warn!(
                    target = "folio::experiences",
                    key,
                    error = %err,
                    "cache invalidation failed after commit"
                );
            }
        }
        for tag in tag_names {
            if let Err(err) = self.cache.invalidate_tag(tag).await {
                counter!("folio_cache_invalidation_error_total").increment(1);
                warn!(
                    target = "folio::experiences",
                    tag,
                    error = %err,
                    "tag invalidation failed after commit"
                );
            }
        }
    }
}
