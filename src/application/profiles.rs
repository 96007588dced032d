//! Profile operations with look-aside caching.
//!
//! Reads populate the cache on miss; writes invalidate after the
//! repository commit. Invalidation failures are logged with a metric
//! and swallowed: a cache outage must never fail a committed write.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::auth::Identity;
use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    CreateProfileParams, ProfileQueryFilter, ProfileSort, ProfilesRepo, RepoError,
    UpdateProfileParams,
};
use crate::cache::{CacheService, SetOptions, keys, tags};
use crate::domain::error::DomainError;
use crate::domain::profiles::{ProfileDraft, ProfileRecord, SocialLinks};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile not found")]
    NotFound,
    #[error("operation not permitted for this identity")]
    Forbidden,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for ProfileError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ProfileError::NotFound,
            other => ProfileError::Repo(other),
        }
    }
}

/// Raw input for create and full-replace update; validated into a
/// [`ProfileDraft`] before touching the repository.
#[derive(Debug, Clone)]
pub struct ProfileInput {
    pub headline: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub social_links: SocialLinks,
}

impl ProfileInput {
    fn into_draft(self) -> Result<ProfileDraft, DomainError> {
        ProfileDraft::validate(self.headline, self.bio, self.avatar_url, self.social_links)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
    pub company: Option<String>,
    pub sort: ProfileSort,
}

#[derive(Clone)]
pub struct ProfileService {
    repo: Arc<dyn ProfilesRepo>,
    cache: CacheService,
}

impl ProfileService {
    pub fn new(repo: Arc<dyn ProfilesRepo>, cache: CacheService) -> Self {
        Self { repo, cache }
    }

    pub async fn create(
        &self,
        identity: &Identity,
        input: ProfileInput,
    ) -> Result<ProfileRecord, ProfileError> {
        let draft = input.into_draft()?;
        let profile = self
            .repo
            .create_profile(CreateProfileParams {
                user_id: identity.subject.clone(),
                draft,
            })
            .await?;

        // A new row can appear in any filtered page, so list entries go.
        // The entity itself is not pre-populated; the next read misses
        // and loads the committed row.
        self.invalidate(&[], &[tags::PROFILE_LISTS.to_string()]).await;

        Ok(profile)
    }

    pub async fn get(&self, id: Uuid) -> Result<ProfileRecord, ProfileError> {
        let key = keys::profile_key(id);
        match self.cache.get::<ProfileRecord>(&key).await {
            Ok(Some(profile)) => return Ok(profile),
            Ok(None) => {}
            Err(err) => {
                counter!("folio_cache_read_error_total").increment(1);
                error!(
                    target = "folio::profiles",
                    %id,
                    error = %err,
                    "cache read failed; falling back to database"
                );
            }
        }

        let profile = self
            .repo
            .find_profile(id)
            .await?
            .ok_or(ProfileError::NotFound)?;

        // Not-found is never cached: a negative entry would mask a
        // subsequent create until it expired.
        let options = SetOptions::default()
            .ttl(self.cache.config().entity_ttl)
            .compress()
            .tag(tags::profile_group(id));
        if let Err(err) = self.cache.set(&key, &profile, options).await {
            warn!(target = "folio::profiles", %id, error = %err, "failed to populate cache");
        }

        Ok(profile)
    }

    pub async fn list(&self, query: ProfileListQuery) -> Result<Page<ProfileRecord>, ProfileError> {
        let request = PageRequest::new(query.page, query.page_size);
        let filter = ProfileQueryFilter {
            search: query.search,
            company: query.company,
        };
        let key = keys::profile_list_key(
            request.page(),
            request.page_size(),
            query.sort.field.as_str(),
            query.sort.direction.as_str(),
            filter.search.as_deref(),
            filter.company.as_deref(),
        );

        match self.cache.get::<Page<ProfileRecord>>(&key).await {
            Ok(Some(page)) => return Ok(page),
            Ok(None) => {}
            Err(err) => {
                counter!("folio_cache_read_error_total").increment(1);
                error!(
                    target = "folio::profiles",
                    error = %err,
                    "list cache read failed; falling back to database"
                );
            }
        }

        let items = self.repo.list_profiles(&filter, query.sort, request).await?;
        let total = self.repo.count_profiles(&filter).await?;
        let page = Page::new(items, request, total);

        let options = SetOptions::default()
            .ttl(self.cache.config().list_ttl)
            .compress()
            .tag(tags::PROFILE_LISTS);
        if let Err(err) = self.cache.set(&key, &page, options).await {
            warn!(target = "folio::profiles", error = %err, "failed to populate list cache");
        }

        Ok(page)
    }

    pub async fn update(
        &self,
        identity: &Identity,
        id: Uuid,
        input: ProfileInput,
    ) -> Result<ProfileRecord, ProfileError> {
        let existing = self
            .repo
            .find_profile(id)
            .await?
            .ok_or(ProfileError::NotFound)?;
        if !identity.can_manage(&existing.user_id) {
            return Err(ProfileError::Forbidden);
        }

        let draft = input.into_draft()?;
        let updated = self
            .repo
            .update_profile(UpdateProfileParams { id, draft })
            .await?;

        // Invalidation runs only after the repository commit; filter
        // membership may have changed, so all list pages go too.
        self.invalidate(
            &[keys::profile_key(id)],
            &[tags::profile_group(id), tags::PROFILE_LISTS.to_string()],
        )
        .await;

        Ok(updated)
    }

    /// Soft delete, admin only. Cascades to the profile's experiences
    /// within the repository transaction.
    pub async fn delete(&self, identity: &Identity, id: Uuid) -> Result<(), ProfileError> {
        if !identity.is_admin() {
            return Err(ProfileError::Forbidden);
        }

        let cascaded = self.repo.soft_delete_profile(id).await?;

        let mut doomed = vec![keys::profile_key(id)];
        doomed.extend(cascaded.into_iter().map(keys::experience_key));
        self.invalidate(
            &doomed,
            &[
                tags::profile_group(id),
                tags::PROFILE_LISTS.to_string(),
                tags::EXPERIENCE_LISTS.to_string(),
            ],
        )
        .await;

        Ok(())
    }

    /// Best-effort post-commit invalidation. One policy everywhere:
    /// log, count, continue.
    async fn invalidate(&self, entity_keys: &[String], tag_names: &[String]) {
        for key in entity_keys {
            if let Err(err) = self.cache.delete(key).await {
                counter!("folio_cache_invalidation_error_total").increment(1);
                warn!(
                    target = "folio::profiles",
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
                    target = "folio::profiles",
                    tag,
                    error = %err,
                    "tag invalidation failed after commit"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, MemoryStore};
    use crate::domain::types::Role;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::OffsetDateTime;

    #[derive(Default)]
    struct InMemoryProfilesRepo {
        rows: Mutex<HashMap<Uuid, ProfileRecord>>,
        find_calls: AtomicUsize,
        list_calls: AtomicUsize,
    }

    impl InMemoryProfilesRepo {
        fn seed(&self, record: ProfileRecord) {
            self.rows.lock().unwrap().insert(record.id, record);
        }
    }

    #[async_trait]
    impl ProfilesRepo for InMemoryProfilesRepo {
        async fn create_profile(
            &self,
            params: CreateProfileParams,
        ) -> Result<ProfileRecord, RepoError> {
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
            self.rows.lock().unwrap().insert(record.id, record.clone());
            Ok(record)
        }

        async fn find_profile(&self, id: Uuid) -> Result<Option<ProfileRecord>, RepoError> {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&id)
                .filter(|record| record.deleted_at.is_none())
                .cloned())
        }

        async fn list_profiles(
            &self,
            _filter: &ProfileQueryFilter,
            _sort: ProfileSort,
            _page: PageRequest,
        ) -> Result<Vec<ProfileRecord>, RepoError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let mut records: Vec<_> = self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|record| record.deleted_at.is_none())
                .cloned()
                .collect();
            records.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(records)
        }

        async fn count_profiles(&self, _filter: &ProfileQueryFilter) -> Result<u64, RepoError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|record| record.deleted_at.is_none())
                .count() as u64)
        }

        async fn update_profile(
            &self,
            params: UpdateProfileParams,
        ) -> Result<ProfileRecord, RepoError> {
            let mut rows = self.rows.lock().unwrap();
            let record = rows
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
            let mut rows = self.rows.lock().unwrap();
            let record = rows
                .get_mut(&id)
                .filter(|record| record.deleted_at.is_none())
                .ok_or(RepoError::NotFound)?;
            record.deleted_at = Some(OffsetDateTime::now_utc());
            Ok(Vec::new())
        }
    }

    fn user(subject: &str) -> Identity {
        Identity {
            subject: subject.to_string(),
            name: None,
            roles: vec![Role::User],
        }
    }

    fn admin() -> Identity {
        Identity {
            subject: "root".to_string(),
            name: None,
            roles: vec![Role::Admin],
        }
    }

    fn input(headline: &str) -> ProfileInput {
        ProfileInput {
            headline: headline.to_string(),
            bio: None,
            avatar_url: None,
            social_links: SocialLinks::default(),
        }
    }

    fn setup() -> (ProfileService, Arc<InMemoryProfilesRepo>, Arc<MemoryStore>) {
        let repo = Arc::new(InMemoryProfilesRepo::default());
        let store = Arc::new(MemoryStore::new());
        let cache = CacheService::new(store.clone(), CacheConfig::default());
        (ProfileService::new(repo.clone(), cache), repo, store)
    }

    #[tokio::test]
    async fn get_miss_populates_cache_and_hit_skips_repo() {
        let (service, repo, _) = setup();
        let created = service
            .create(&user("alice"), input("Staff Engineer"))
            .await
            .unwrap();

        let first = service.get(created.id).await.unwrap();
        assert_eq!(first.headline, "Staff Engineer");
        let after_first = repo.find_calls.load(Ordering::SeqCst);

        let second = service.get(created.id).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(repo.find_calls.load(Ordering::SeqCst), after_first);
    }

    #[tokio::test]
    async fn not_found_is_never_cached() {
        let (service, _, store) = setup();
        let id = Uuid::new_v4();

        let result = service.get(id).await;
        assert!(matches!(result, Err(ProfileError::NotFound)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn repeated_identical_list_queries_hit_the_repo_once() {
        let (service, repo, _) = setup();
        service.create(&user("alice"), input("Engineer")).await.unwrap();
        let list_calls_after_create = repo.list_calls.load(Ordering::SeqCst);

        for _ in 0..5 {
            let page = service.list(ProfileListQuery::default()).await.unwrap();
            assert_eq!(page.total, 1);
        }

        assert_eq!(
            repo.list_calls.load(Ordering::SeqCst),
            list_calls_after_create + 1
        );
    }

    #[tokio::test]
    async fn different_list_parameters_do_not_share_entries() {
        let (service, repo, _) = setup();
        service.create(&user("alice"), input("Engineer")).await.unwrap();

        service.list(ProfileListQuery::default()).await.unwrap();
        service
            .list(ProfileListQuery {
                search: Some("rust".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn update_invalidates_the_cached_entity() {
        let (service, _, _) = setup();
        let alice = user("alice");
        let created = service.create(&alice, input("Old Headline")).await.unwrap();

        // Populate the cache with the pre-write value.
        service.get(created.id).await.unwrap();

        service
            .update(&alice, created.id, input("New Headline"))
            .await
            .unwrap();

        let fetched = service.get(created.id).await.unwrap();
        assert_eq!(fetched.headline, "New Headline");
    }

    #[tokio::test]
    async fn create_invalidates_list_pages() {
        let (service, repo, _) = setup();
        let alice = user("alice");
        service.create(&alice, input("First")).await.unwrap();

        let page = service.list(ProfileListQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);

        service.create(&alice, input("Second")).await.unwrap();

        let page = service.list(ProfileListQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(repo.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_owner_cannot_update() {
        let (service, _, _) = setup();
        let created = service.create(&user("alice"), input("Mine")).await.unwrap();

        let result = service
            .update(&user("bob"), created.id, input("Not yours"))
            .await;
        assert!(matches!(result, Err(ProfileError::Forbidden)));
    }

    #[tokio::test]
    async fn moderator_can_update_any_profile() {
        let (service, _, _) = setup();
        let created = service.create(&user("alice"), input("Original")).await.unwrap();

        let moderator = Identity {
            subject: "mod".to_string(),
            name: None,
            roles: vec![Role::User, Role::Moderator],
        };
        let updated = service
            .update(&moderator, created.id, input("Moderated"))
            .await
            .unwrap();
        assert_eq!(updated.headline, "Moderated");
    }

    #[tokio::test]
    async fn delete_requires_admin_and_is_not_repeatable() {
        let (service, _, _) = setup();
        let alice = user("alice");
        let created = service.create(&alice, input("Doomed")).await.unwrap();

        assert!(matches!(
            service.delete(&alice, created.id).await,
            Err(ProfileError::Forbidden)
        ));

        service.delete(&admin(), created.id).await.unwrap();

        // Idempotence: the second delete sees NotFound, nothing else.
        assert!(matches!(
            service.delete(&admin(), created.id).await,
            Err(ProfileError::NotFound)
        ));
        assert!(matches!(
            service.get(created.id).await,
            Err(ProfileError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_purges_the_cached_entity() {
        let (service, _, store) = setup();
        let created = service.create(&user("alice"), input("Cached")).await.unwrap();
        service.get(created.id).await.unwrap();
        assert!(!store.is_empty());

        service.delete(&admin(), created.id).await.unwrap();

        assert!(matches!(
            service.get(created.id).await,
            Err(ProfileError::NotFound)
        ));
    }

    #[tokio::test]
    async fn validation_failures_surface_before_any_write() {
        let (service, repo, _) = setup();
        let result = service.create(&user("alice"), input("ab")).await;
        match result {
            Err(ProfileError::Domain(DomainError::Validation { issues })) => {
                assert_eq!(issues[0].field, "headline");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(repo.rows.lock().unwrap().len(), 0);
    }
}
