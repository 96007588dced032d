//! Postgres-backed repository implementations.

mod experiences;
mod profiles;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, QueryBuilder, Transaction,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::{ExperienceQueryFilter, ProfileQueryFilter, RepoError};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    /// Shared filter conditions for profile listings. `search` matches
    /// headline and bio; `company` matches through live experiences.
    fn apply_profile_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q ProfileQueryFilter) {
        if let Some(search) = filter.search.as_ref() {
            let pattern = format!("%{}%", search);
            qb.push(" AND (");
            qb.push("p.headline ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR COALESCE(p.bio, '') ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }

        if let Some(company) = filter.company.as_ref() {
            qb.push(
                " AND EXISTS (SELECT 1 FROM experiences e \
                 WHERE e.profile_id = p.id AND e.deleted_at IS NULL AND e.company ILIKE ",
            );
            qb.push_bind(format!("%{}%", company));
            qb.push(")");
        }
    }

    fn apply_experience_filter<'q>(
        qb: &mut QueryBuilder<'q, Postgres>,
        filter: &'q ExperienceQueryFilter,
    ) {
        if let Some(profile_id) = filter.profile_id {
            qb.push(" AND e.profile_id = ");
            qb.push_bind(profile_id);
            qb.push(" ");
        }

        if let Some(company) = filter.company.as_ref() {
            qb.push(" AND e.company ILIKE ");
            qb.push_bind(format!("%{}%", company));
            qb.push(" ");
        }

        if let Some(search) = filter.search.as_ref() {
            let pattern = format!("%{}%", search);
            qb.push(" AND (");
            qb.push("e.title ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR e.company ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR COALESCE(e.description, '') ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}
