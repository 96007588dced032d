use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{
    application::pagination::PageRequest,
    application::repos::{
        CreateExperienceParams, ExperienceQueryFilter, ExperiencesRepo, RepoError,
        UpdateExperienceParams,
    },
    domain::experiences::ExperienceRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const EXPERIENCE_COLUMNS: &str = "e.id, e.profile_id, e.title, e.company, e.start_date, \
     e.end_date, e.description, e.created_at, e.updated_at, e.deleted_at";

#[derive(sqlx::FromRow)]
struct ExperienceRow {
    id: Uuid,
    profile_id: Uuid,
    title: String,
    company: String,
    start_date: Date,
    end_date: Option<Date>,
    description: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<ExperienceRow> for ExperienceRecord {
    fn from(row: ExperienceRow) -> Self {
        Self {
            id: row.id,
            profile_id: row.profile_id,
            title: row.title,
            company: row.company,
            start_date: row.start_date,
            end_date: row.end_date,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[async_trait]
impl ExperiencesRepo for PostgresRepositories {
    async fn create_experience(
        &self,
        params: CreateExperienceParams,
    ) -> Result<ExperienceRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, ExperienceRow>(
            "INSERT INTO experiences (
                id, profile_id, title, company, start_date, end_date,
                description, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING id, profile_id, title, company, start_date, end_date,
                      description, created_at, updated_at, deleted_at",
        )
        .bind(id)
        .bind(params.profile_id)
        .bind(&params.draft.title)
        .bind(&params.draft.company)
        .bind(params.draft.start_date)
        .bind(params.draft.end_date)
        .bind(&params.draft.description)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ExperienceRecord::from(row))
    }

    async fn find_experience(&self, id: Uuid) -> Result<Option<ExperienceRecord>, RepoError> {
        let row = sqlx::query_as::<_, ExperienceRow>(
            "SELECT id, profile_id, title, company, start_date, end_date,
                    description, created_at, updated_at, deleted_at
             FROM experiences
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ExperienceRecord::from))
    }

    async fn list_experiences(
        &self,
        filter: &ExperienceQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<ExperienceRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(EXPERIENCE_COLUMNS);
        qb.push(" FROM experiences e WHERE e.deleted_at IS NULL ");

        Self::apply_experience_filter(&mut qb, filter);

        // Reverse-chronological by tenure, current roles first.
        qb.push(" ORDER BY e.end_date IS NULL DESC, e.start_date DESC, e.id DESC ");

        qb.push(" LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows = qb
            .build_query_as::<ExperienceRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ExperienceRecord::from).collect())
    }

    async fn count_experiences(&self, filter: &ExperienceQueryFilter) -> Result<u64, RepoError> {
        let mut qb =
            QueryBuilder::new("SELECT COUNT(*) FROM experiences e WHERE e.deleted_at IS NULL ");
        Self::apply_experience_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn update_experience(
        &self,
        params: UpdateExperienceParams,
    ) -> Result<ExperienceRecord, RepoError> {
        let row = sqlx::query_as::<_, ExperienceRow>(
            "UPDATE experiences
             SET title = $2,
                 company = $3,
                 start_date = $4,
                 end_date = $5,
                 description = $6,
                 updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING id, profile_id, title, company, start_date, end_date,
                       description, created_at, updated_at, deleted_at",
        )
        .bind(params.id)
        .bind(&params.draft.title)
        .bind(&params.draft.company)
        .bind(params.draft.start_date)
        .bind(params.draft.end_date)
        .bind(&params.draft.description)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(ExperienceRecord::from(row))
    }

    async fn soft_delete_experience(&self, id: Uuid) -> Result<(), RepoError> {
        let deleted: Option<Uuid> = sqlx::query_scalar(
            "UPDATE experiences
             SET deleted_at = now(), updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING id",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        deleted.map(|_| ()).ok_or(RepoError::NotFound)
    }
}
