use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{NewUser, User, UserRow, DEFAULT_PHOTO};
use crate::db::StoreError;

/// Persistence for principals. Every lookup except
/// [`UserStore::find_by_id_including_inactive`] skips inactive accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Internal lookup for audit and reactivation.
    async fn find_by_id_including_inactive(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Case-insensitive.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Swaps in `password_hash` for the active user holding an unexpired
    /// reset token with this hash, clearing the token in the same write.
    /// At most one caller wins a given token. An expired match is cleared
    /// and yields `None`.
    async fn consume_reset_token(
        &self,
        hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;

    async fn list_active(&self) -> Result<Vec<User>, StoreError>;

    /// Replaces the credential and clears any pending reset token.
    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    async fn set_reset_token(
        &self,
        id: Uuid,
        hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Soft delete. Returns false when no active user has this id.
    async fn deactivate(&self, id: Uuid) -> Result<bool, StoreError>;
}

const USER_COLUMNS: &str = "id, name, email, photo, role, password_hash, password_changed_at, \
     password_reset_hash, password_reset_expires_at, active, created_at";

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_by_id(&self, predicate: &str, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users (id, name, email, photo, role, password_hash) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(DEFAULT_PHOTO)
            .bind(user.role.as_str())
            .bind(&user.password_hash)
            .fetch_one(&self.db)
            .await
            .map_err(|e| StoreError::from_unique_violation(e, "users_email_key", "email"))?;
        User::try_from(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.fetch_by_id("id = $1 AND active", id).await
    }

    async fn find_by_id_including_inactive(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.fetch_by_id("id = $1", id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1) AND active");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn consume_reset_token(
        &self,
        hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "UPDATE users \
                SET password_hash = $3, \
                    password_changed_at = $4, \
                    password_reset_hash = NULL, \
                    password_reset_expires_at = NULL \
              WHERE password_reset_hash = $1 AND password_reset_expires_at > $2 AND active \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(hash)
            .bind(now)
            .bind(password_hash)
            .bind(changed_at)
            .fetch_optional(&self.db)
            .await?;

        if row.is_none() {
            sqlx::query(
                r#"
                UPDATE users
                   SET password_reset_hash = NULL,
                       password_reset_expires_at = NULL
                 WHERE password_reset_hash = $1 AND password_reset_expires_at <= $2
                "#,
            )
            .bind(hash)
            .bind(now)
            .execute(&self.db)
            .await?;
        }
        row.map(User::try_from).transpose()
    }

    async fn list_active(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE active ORDER BY created_at");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.db)
            .await?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2,
                   password_changed_at = $3,
                   password_reset_hash = NULL,
                   password_reset_expires_at = NULL
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_reset_hash = $2,
                   password_reset_expires_at = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(hash)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, StoreError> {
        let done = sqlx::query("UPDATE users SET active = FALSE WHERE id = $1 AND active")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}
