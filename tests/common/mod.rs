//! Shared in-memory fixtures for router-level tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use time::OffsetDateTime;
use uuid::Uuid;

use folio::application::auth::{Identity, StaticIdentityProvider};
use folio::application::experiences::ExperienceService;
use folio::application::pagination::PageRequest;
use folio::application::profiles::ProfileService;
use folio::application::repos::{
    CreateExperienceParams, CreateProfileParams, ExperienceQueryFilter, ExperiencesRepo,
    ProfileQueryFilter, ProfileSort, ProfilesRepo, RepoError, UpdateExperienceParams,
    UpdateProfileParams,
};
use folio::cache::{CacheConfig, CacheService, MemoryStore};
use folio::domain::experiences::ExperienceRecord;
use folio::domain::profiles::ProfileRecord;
use folio::domain::types::Role;
use folio::infra::http::{self, AppState, DatabasePing, RateLimitTiers, TieredRateLimiter};

pub const USER_TOKEN: &str = "token-user";
pub const OTHER_USER_TOKEN: &str = "token-other";
pub const ADMIN_TOKEN: &str = "token-admin";

#[derive(Default)]
pub struct InMemoryRepos {
    pub profiles: Mutex<HashMap<Uuid, ProfileRecord>>,
    pub experiences: Mutex<HashMap<Uuid, ExperienceRecord>>,
    pub profile_list_calls: AtomicUsize,
    pub profile_find_calls: AtomicUsize,
}

#[async_trait]
impl ProfilesRepo for InMemoryRepos {
    async fn create_profile(&self, params: CreateProfileParams) -> Result<ProfileRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = ProfileRecord {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            headline: params.draft.headline,
            bio: params.draft.bio,
            avatar_url: params.draft.avatar_url,
            social_links: params.draft.social_links,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.profiles
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_profile(&self, id: Uuid) -> Result<Option<ProfileRecord>, RepoError> {
        self.profile_find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .get(&id)
            .filter(|record| record.deleted_at.is_none())
            .cloned())
    }

    async fn list_profiles(
        &self,
        filter: &ProfileQueryFilter,
        _sort: ProfileSort,
        page: PageRequest,
    ) -> Result<Vec<ProfileRecord>, RepoError> {
        self.profile_list_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.filtered_profiles(filter);
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(records
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn count_profiles(&self, filter: &ProfileQueryFilter) -> Result<u64, RepoError> {
        Ok(self.filtered_profiles(filter).len() as u64)
    }

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<ProfileRecord, RepoError> {
        let mut profiles = self.profiles.lock().unwrap();
        let record = profiles
            .get_mut(&params.id)
            .filter(|record| record.deleted_at.is_none())
            .ok_or(RepoError::NotFound)?;
        record.headline = params.draft.headline;
        record.bio = params.draft.bio;
        record.avatar_url = params.draft.avatar_url;
        record.social_links = params.draft.social_links;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }

    async fn soft_delete_profile(&self, id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        let mut profiles = self.profiles.lock().unwrap();
        let record = profiles
            .get_mut(&id)
            .filter(|record| record.deleted_at.is_none())
            .ok_or(RepoError::NotFound)?;
        let now = OffsetDateTime::now_utc();
        record.deleted_at = Some(now);

        let mut cascaded = Vec::new();
        for experience in self.experiences.lock().unwrap().values_mut() {
            if experience.profile_id == id && experience.deleted_at.is_none() {
                experience.deleted_at = Some(now);
                cascaded.push(experience.id);
            }
        }
        Ok(cascaded)
    }
}

#[async_trait]
impl ExperiencesRepo for InMemoryRepos {
    async fn create_experience(
        &self,
        params: CreateExperienceParams,
    ) -> Result<ExperienceRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = ExperienceRecord {
            id: Uuid::new_v4(),
            profile_id: params.profile_id,
            title: params.draft.title,
            company: params.draft.company,
            start_date: params.draft.start_date,
            end_date: params.draft.end_date,
            description: params.draft.description,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.experiences
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_experience(&self, id: Uuid) -> Result<Option<ExperienceRecord>, RepoError> {
        Ok(self
            .experiences
            .lock()
            .unwrap()
            .get(&id)
            .filter(|record| record.deleted_at.is_none())
            .cloned())
    }

    async fn list_experiences(
        &self,
        filter: &ExperienceQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<ExperienceRecord>, RepoError> {
        let mut records: Vec<_> = self
            .experiences
            .lock()
            .unwrap()
            .values()
            .filter(|record| record.deleted_at.is_none())
            .filter(|record| matches_experience(record, filter))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(a.id.cmp(&b.id)));
        Ok(records
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn count_experiences(&self, filter: &ExperienceQueryFilter) -> Result<u64, RepoError> {
        Ok(self
            .experiences
            .lock()
            .unwrap()
            .values()
            .filter(|record| record.deleted_at.is_none())
            .filter(|record| matches_experience(record, filter))
            .count() as u64)
    }

    async fn update_experience(
        &self,
        params: UpdateExperienceParams,
    ) -> Result<ExperienceRecord, RepoError> {
        let mut experiences = self.experiences.lock().unwrap();
        let record = experiences
            .get_mut(&params.id)
            .filter(|record| record.deleted_at.is_none())
            .ok_or(RepoError::NotFound)?;
        record.title = params.draft.title;
        record.company = params.draft.company;
        record.start_date = params.draft.start_date;
        record.end_date = params.draft.end_date;
        record.description = params.draft.description;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }

    async fn soft_delete_experience(&self, id: Uuid) -> Result<(), RepoError> {
        let mut experiences = self.experiences.lock().unwrap();
        let record = experiences
            .get_mut(&id)
            .filter(|record| record.deleted_at.is_none())
            .ok_or(RepoError::NotFound)?;
        record.deleted_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }
}

impl InMemoryRepos {
    // Lock order is profiles then experiences, matching
    // soft_delete_profile.
    fn filtered_profiles(&self, filter: &ProfileQueryFilter) -> Vec<ProfileRecord> {
        let mut records: Vec<_> = self
            .profiles
            .lock()
            .unwrap()
            .values()
            .filter(|record| record.deleted_at.is_none())
            .filter(|record| matches_profile(record, filter))
            .cloned()
            .collect();
        if let Some(company) = filter.company.as_deref() {
            let needle = company.to_lowercase();
            let experiences = self.experiences.lock().unwrap();
            records.retain(|record| {
                experiences.values().any(|experience| {
                    experience.profile_id == record.id
                        && experience.deleted_at.is_none()
                        && experience.company.to_lowercase().contains(&needle)
                })
            });
        }
        records
    }
}

fn matches_profile(record: &ProfileRecord, filter: &ProfileQueryFilter) -> bool {
    filter.search.as_deref().is_none_or(|needle| {
        let needle = needle.to_lowercase();
        record.headline.to_lowercase().contains(&needle)
            || record
                .bio
                .as_deref()
                .is_some_and(|bio| bio.to_lowercase().contains(&needle))
    })
}

fn matches_experience(record: &ExperienceRecord, filter: &ExperienceQueryFilter) -> bool {
    filter
        .profile_id
        .is_none_or(|profile_id| record.profile_id == profile_id)
        && filter.company.as_deref().is_none_or(|needle| {
            record
                .company
                .to_lowercase()
                .contains(&needle.to_lowercase())
        })
}

pub struct StubDb;

#[async_trait]
impl DatabasePing for StubDb {
    async fn ping(&self) -> Result<(), String> {
        Ok(())
    }
}

pub struct Harness {
    pub router: Router,
    pub repos: Arc<InMemoryRepos>,
    pub store: Arc<MemoryStore>,
}

pub fn harness() -> Harness {
    harness_with_tiers(RateLimitTiers {
        anonymous: 1_000,
        user: 1_000,
        moderator: 1_000,
        admin: 1_000,
    })
}

pub fn harness_with_tiers(tiers: RateLimitTiers) -> Harness {
    let repos = Arc::new(InMemoryRepos::default());
    let store = Arc::new(MemoryStore::new());
    let cache = CacheService::new(store.clone(), CacheConfig::default());

    let identity = StaticIdentityProvider::new();
    identity.insert(
        USER_TOKEN,
        Identity {
            subject: "alice".to_string(),
            name: Some("Alice".to_string()),
            roles: vec![Role::User],
        },
    );
    identity.insert(
        OTHER_USER_TOKEN,
        Identity {
            subject: "bob".to_string(),
            name: None,
            roles: vec![Role::User],
        },
    );
    identity.insert(
        ADMIN_TOKEN,
        Identity {
            subject: "root".to_string(),
            name: None,
            roles: vec![Role::Admin],
        },
    );

    let state = AppState {
        profiles: ProfileService::new(repos.clone(), cache.clone()),
        experiences: ExperienceService::new(repos.clone(), repos.clone(), cache.clone()),
        cache,
        identity: Arc::new(identity),
        rate_limiter: Arc::new(TieredRateLimiter::new(Duration::from_secs(60), tiers)),
        db: Arc::new(StubDb),
        request_timeout: Duration::from_secs(5),
    };

    Harness {
        router: http::build_router(state),
        repos,
        store,
    }
}
