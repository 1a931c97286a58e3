use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

use crate::error::AppError;

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run database migrations")?;

    Ok(db)
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint was violated; holds the field name.
    #[error("duplicate value for {0}")]
    Duplicate(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("in-memory store lock poisoned")]
    Poisoned,

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Maps a Postgres unique violation on `constraint` to `Duplicate(field)`.
    pub fn from_unique_violation(err: sqlx::Error, constraint: &str, field: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() && db_err.constraint() == Some(constraint) {
                return StoreError::Duplicate(field.to_string());
            }
        }
        StoreError::Database(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => {
                AppError::Conflict(format!("A record with this {field} already exists"))
            }
            other => AppError::Unexpected(anyhow::Error::new(other).context("store operation")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_maps_to_conflict() {
        let err: AppError = StoreError::Duplicate("email".into()).into();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("email")));
    }

    #[test]
    fn other_store_errors_are_unexpected() {
        let err: AppError = StoreError::Poisoned.into();
        assert!(matches!(err, AppError::Unexpected(_)));
        let err: AppError = StoreError::from_unique_violation(
            sqlx::Error::RowNotFound,
            "users_email_key",
            "email",
        )
        .into();
        assert!(matches!(err, AppError::Unexpected(_)));
    }
}
