use sqlx::error::DatabaseError;

use crate::application::repos::RepoError;

// Constraint names from migrations/; matching on them keeps the error
// taxonomy stable even when Postgres rewords its messages.
const PROFILE_LIVE_UNIQUE: &str = "profiles_user_id_live_idx";
const EXPERIENCE_PROFILE_FK: &str = "experiences_profile_id_fkey";
const EXPERIENCE_DATE_RANGE: &str = "experiences_date_range_chk";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => map_database_error(db),
        other => RepoError::from_persistence(other),
    }
}

fn map_database_error(db: Box<dyn DatabaseError>) -> RepoError {
    match db.constraint() {
        Some(PROFILE_LIVE_UNIQUE) => {
            return RepoError::Duplicate {
                constraint: PROFILE_LIVE_UNIQUE.to_string(),
            };
        }
        Some(EXPERIENCE_PROFILE_FK) => {
            return RepoError::InvalidInput {
                message: "experience references an unknown profile".to_string(),
            };
        }
        Some(EXPERIENCE_DATE_RANGE) => {
            return RepoError::InvalidInput {
                message: "end date must not precede start date".to_string(),
            };
        }
        _ => {}
    }

    let message = db.message();
    if message.contains("duplicate key") {
        return RepoError::Duplicate {
            constraint: db.constraint().unwrap_or("unknown").to_string(),
        };
    }
    if message.contains("invalid input syntax") {
        return RepoError::InvalidInput {
            message: message.to_string(),
        };
    }
    if message.contains("violates") {
        return RepoError::Integrity {
            message: message.to_string(),
        };
    }
    if message.contains("canceling statement due to user request") {
        return RepoError::Timeout;
    }

    RepoError::from_persistence(sqlx::Error::Database(db))
}
