use async_trait::async_trait;
use sqlx::QueryBuilder;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::PageRequest,
    application::repos::{
        CreateProfileParams, ProfileQueryFilter, ProfileSort, ProfilesRepo, RepoError,
        UpdateProfileParams,
    },
    domain::profiles::{ProfileRecord, SocialLinks},
};

use super::{PostgresRepositories, map_sqlx_error};

const PROFILE_COLUMNS: &str = "p.id, p.user_id, p.headline, p.bio, p.avatar_url, \
     p.social_links, p.created_at, p.updated_at, p.deleted_at";

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    user_id: String,
    headline: String,
    bio: Option<String>,
    avatar_url: Option<String>,
    social_links: Json<SocialLinks>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<ProfileRow> for ProfileRecord {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            headline: row.headline,
            bio: row.bio,
            avatar_url: row.avatar_url,
            social_links: row.social_links.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[async_trait]
impl ProfilesRepo for PostgresRepositories {
    async fn create_profile(
        &self,
        params: CreateProfileParams,
    ) -> Result<ProfileRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, ProfileRow>(
            "INSERT INTO profiles (
                id, user_id, headline, bio, avatar_url, social_links,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING id, user_id, headline, bio, avatar_url, social_links,
                      created_at, updated_at, deleted_at",
        )
        .bind(id)
        .bind(&params.user_id)
        .bind(&params.draft.headline)
        .bind(&params.draft.bio)
        .bind(&params.draft.avatar_url)
        .bind(Json(&params.draft.social_links))
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ProfileRecord::from(row))
    }

    async fn find_profile(&self, id: Uuid) -> Result<Option<ProfileRecord>, RepoError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, user_id, headline, bio, avatar_url, social_links,
                    created_at, updated_at, deleted_at
             FROM profiles
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ProfileRecord::from))
    }

    async fn list_profiles(
        &self,
        filter: &ProfileQueryFilter,
        sort: ProfileSort,
        page: PageRequest,
    ) -> Result<Vec<ProfileRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(PROFILE_COLUMNS);
        qb.push(" FROM profiles p WHERE p.deleted_at IS NULL ");

        Self::apply_profile_filter(&mut qb, filter);

        // Sort column comes from a closed enum, never from user text.
        qb.push(" ORDER BY p.");
        qb.push(sort.field.as_str());
        qb.push(" ");
        qb.push(sort.direction.sql());
        qb.push(", p.id DESC ");

        qb.push(" LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows = qb
            .build_query_as::<ProfileRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ProfileRecord::from).collect())
    }

    async fn count_profiles(&self, filter: &ProfileQueryFilter) -> Result<u64, RepoError> {
        let mut qb =
            QueryBuilder::new("SELECT COUNT(*) FROM profiles p WHERE p.deleted_at IS NULL ");
        Self::apply_profile_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn update_profile(
        &self,
        params: UpdateProfileParams,
    ) -> Result<ProfileRecord, RepoError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "UPDATE profiles
             SET headline = $2,
                 bio = $3,
                 avatar_url = $4,
                 social_links = $5,
                 updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING id, user_id, headline, bio, avatar_url, social_links,
                       created_at, updated_at, deleted_at",
        )
        .bind(params.id)
        .bind(&params.draft.headline)
        .bind(&params.draft.bio)
        .bind(&params.draft.avatar_url)
        .bind(Json(&params.draft.social_links))
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(ProfileRecord::from(row))
    }

    async fn soft_delete_profile(&self, id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let deleted: Option<Uuid> = sqlx::query_scalar(
            "UPDATE profiles
             SET deleted_at = now(), updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING id",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if deleted.is_none() {
            return Err(RepoError::NotFound);
        }

        let cascaded: Vec<Uuid> = sqlx::query_scalar(
            "UPDATE experiences
             SET deleted_at = now(), updated_at = now()
             WHERE profile_id = $1 AND deleted_at IS NULL
             RETURNING id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(cascaded)
    }
}
