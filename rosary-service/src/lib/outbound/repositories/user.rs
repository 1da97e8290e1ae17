use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::postgres::PgArguments;
use sqlx::postgres::PgRow;
use sqlx::query::Query;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::user::errors::UserError;
use crate::domain::user::models::EmailAddress;
use crate::domain::user::models::PendingEmailChange;
use crate::domain::user::models::PendingToken;
use crate::domain::user::models::RefreshTokenRecord;
use crate::domain::user::models::ScheduledDeletion;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::ports::UserRepository;

const USER_COLUMNS: &str = r#"
    id, email, password_hash, is_verified,
    verification_token, verification_token_expires_at,
    pending_email, email_change_token, email_change_token_expires_at,
    password_reset_token, password_reset_token_expires_at,
    deletion_scheduled_at, created_at
"#;

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn select_where(condition: &str) -> String {
        format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, condition)
    }

    async fn fetch_user(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<Option<User>, UserError> {
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        match row {
            Some(r) => {
                let refresh_tokens = self.load_refresh_tokens(r.get("id")).await?;
                Ok(Some(Self::row_to_user(&r, refresh_tokens)?))
            }
            None => Ok(None),
        }
    }

    async fn load_refresh_tokens(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, UserError> {
        let rows = sqlx::query(
            r#"
            SELECT id, token_hash, expires_at, created_at
            FROM refresh_tokens
            WHERE user_id = $1
            ORDER BY seq
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(rows
            .into_iter()
            .map(|r| RefreshTokenRecord {
                id: r.get("id"),
                token_hash: r.get("token_hash"),
                expires_at: r.get("expires_at"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    fn row_to_user(
        r: &PgRow,
        refresh_tokens: Vec<RefreshTokenRecord>,
    ) -> Result<User, UserError> {
        let verification = pending_token(
            r.get("verification_token"),
            r.get("verification_token_expires_at"),
        );
        let password_reset = pending_token(
            r.get("password_reset_token"),
            r.get("password_reset_token_expires_at"),
        );

        let pending_email: Option<String> = r.get("pending_email");
        let email_change = match (
            pending_email,
            r.get::<Option<String>, _>("email_change_token"),
            r.get::<Option<DateTime<Utc>>, _>("email_change_token_expires_at"),
        ) {
            (Some(new_email), Some(token), Some(expires_at)) => Some(PendingEmailChange {
                new_email: EmailAddress::new(new_email)?,
                token,
                expires_at,
            }),
            _ => None,
        };

        Ok(User {
            id: UserId(r.get("id")),
            email: EmailAddress::new(r.get("email"))?,
            password_hash: r.get("password_hash"),
            is_verified: r.get("is_verified"),
            refresh_tokens,
            verification,
            email_change,
            password_reset,
            deletion: r
                .get::<Option<DateTime<Utc>>, _>("deletion_scheduled_at")
                .map(|scheduled_at| ScheduledDeletion { scheduled_at }),
            created_at: r.get("created_at"),
        })
    }

    /// Run an update that must touch exactly the user row identified by `id`.
    async fn update_user(
        &self,
        id: &UserId,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<(), UserError> {
        let result = query.execute(&self.pool).await.map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(UserError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn pending_token(
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
) -> Option<PendingToken> {
    match (token, expires_at) {
        (Some(token), Some(expires_at)) => Some(PendingToken { token, expires_at }),
        _ => None,
    }
}

fn database_error(e: sqlx::Error) -> UserError {
    UserError::DatabaseError(e.to_string())
}

fn email_conflict(e: sqlx::Error, email: &EmailAddress) -> UserError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() && db_err.constraint() == Some("users_email_key") {
            return UserError::EmailAlreadyExists(email.as_str().to_string());
        }
    }
    database_error(e)
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: User) -> Result<User, UserError> {
        let mut transaction = self.pool.begin().await.map_err(database_error)?;

        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, password_hash, is_verified,
                verification_token, verification_token_expires_at,
                deletion_scheduled_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id.0)
        .bind(user.email.as_str())
        .bind(&user.password_hash)
        .bind(user.is_verified)
        .bind(user.verification.as_ref().map(|v| v.token.as_str()))
        .bind(user.verification.as_ref().map(|v| v.expires_at))
        .bind(user.deletion.map(|d| d.scheduled_at))
        .bind(user.created_at)
        .execute(&mut *transaction)
        .await
        .map_err(|e| email_conflict(e, &user.email))?;

        for record in &user.refresh_tokens {
            sqlx::query(
                r#"
                INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(record.id)
            .bind(user.id.0)
            .bind(&record.token_hash)
            .bind(record.expires_at)
            .bind(record.created_at)
            .execute(&mut *transaction)
            .await
            .map_err(database_error)?;
        }

        transaction.commit().await.map_err(database_error)?;

        Ok(user)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError> {
        self.fetch_user(sqlx::query(&Self::select_where("id = $1")).bind(id.0))
            .await
    }

    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, UserError> {
        self.fetch_user(sqlx::query(&Self::select_where("email = $1")).bind(email.as_str()))
            .await
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, UserError> {
        self.fetch_user(sqlx::query(&Self::select_where("verification_token = $1")).bind(token))
            .await
    }

    async fn find_by_email_change_token(&self, token: &str) -> Result<Option<User>, UserError> {
        self.fetch_user(sqlx::query(&Self::select_where("email_change_token = $1")).bind(token))
            .await
    }

    async fn find_by_password_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, UserError> {
        self.fetch_user(sqlx::query(&Self::select_where("password_reset_token = $1")).bind(token))
            .await
    }

    async fn set_verification_pending(
        &self,
        id: &UserId,
        verification: PendingToken,
    ) -> Result<bool, UserError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET verification_token = $2,
                verification_token_expires_at = $3
            WHERE id = $1 AND is_verified = FALSE
            "#,
        )
        .bind(id.0)
        .bind(verification.token)
        .bind(verification.expires_at)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn verify_account(&self, id: &UserId, token: &str) -> Result<bool, UserError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_verified = TRUE,
                verification_token = NULL,
                verification_token_expires_at = NULL
            WHERE id = $1 AND verification_token = $2
            "#,
        )
        .bind(id.0)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_refresh_token(
        &self,
        id: &UserId,
        record: RefreshTokenRecord,
    ) -> Result<(), UserError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(id.0)
        .bind(record.token_hash)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_foreign_key_violation() {
                    return UserError::NotFound(id.to_string());
                }
            }
            database_error(e)
        })?;

        Ok(())
    }

    async fn prune_refresh_tokens(
        &self,
        id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, UserError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1 AND expires_at <= $2
            "#,
        )
        .bind(id.0)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected())
    }

    async fn trim_refresh_tokens(&self, id: &UserId, max: usize) -> Result<u64, UserError> {
        let keep = i64::try_from(max).unwrap_or(i64::MAX);

        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1
              AND seq NOT IN (
                  SELECT seq FROM refresh_tokens
                  WHERE user_id = $1
                  ORDER BY seq DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(id.0)
        .bind(keep)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected())
    }

    async fn replace_refresh_token(
        &self,
        id: &UserId,
        old_record_id: &Uuid,
        new_record: RefreshTokenRecord,
    ) -> Result<bool, UserError> {
        // A concurrent rotation of the same row re-checks the id after the row
        // lock is released and matches nothing.
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET id = $3, token_hash = $4, expires_at = $5, created_at = $6
            WHERE user_id = $1 AND id = $2
            "#,
        )
        .bind(id.0)
        .bind(*old_record_id)
        .bind(new_record.id)
        .bind(new_record.token_hash)
        .bind(new_record.expires_at)
        .bind(new_record.created_at)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_refresh_token(
        &self,
        id: &UserId,
        record_id: &Uuid,
    ) -> Result<bool, UserError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1 AND id = $2")
            .bind(id.0)
            .bind(*record_id)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_password_and_clear_tokens(
        &self,
        id: &UserId,
        password_hash: String,
    ) -> Result<(), UserError> {
        let mut transaction = self.pool.begin().await.map_err(database_error)?;

        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id.0)
            .bind(password_hash)
            .execute(&mut *transaction)
            .await
            .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Err(UserError::NotFound(id.to_string()));
        }

        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(id.0)
            .execute(&mut *transaction)
            .await
            .map_err(database_error)?;

        transaction.commit().await.map_err(database_error)
    }

    async fn mark_email_change_pending(
        &self,
        id: &UserId,
        change: PendingEmailChange,
    ) -> Result<(), UserError> {
        self.update_user(
            id,
            sqlx::query(
                r#"
                UPDATE users
                SET pending_email = $2,
                    email_change_token = $3,
                    email_change_token_expires_at = $4
                WHERE id = $1
                "#,
            )
            .bind(id.0)
            .bind(change.new_email.as_str().to_string())
            .bind(change.token)
            .bind(change.expires_at),
        )
        .await
    }

    async fn confirm_email_change(
        &self,
        id: &UserId,
        token: &str,
        new_email: &EmailAddress,
    ) -> Result<bool, UserError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $3,
                pending_email = NULL,
                email_change_token = NULL,
                email_change_token_expires_at = NULL
            WHERE id = $1 AND email_change_token = $2 AND pending_email = $3
            "#,
        )
        .bind(id.0)
        .bind(token)
        .bind(new_email.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| email_conflict(e, new_email))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_password_reset_token(
        &self,
        id: &UserId,
        reset: PendingToken,
    ) -> Result<(), UserError> {
        self.update_user(
            id,
            sqlx::query(
                r#"
                UPDATE users
                SET password_reset_token = $2,
                    password_reset_token_expires_at = $3
                WHERE id = $1
                "#,
            )
            .bind(id.0)
            .bind(reset.token)
            .bind(reset.expires_at),
        )
        .await
    }

    async fn reset_password(
        &self,
        id: &UserId,
        token: &str,
        password_hash: String,
    ) -> Result<bool, UserError> {
        let mut transaction = self.pool.begin().await.map_err(database_error)?;

        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $3,
                password_reset_token = NULL,
                password_reset_token_expires_at = NULL
            WHERE id = $1 AND password_reset_token = $2
            "#,
        )
        .bind(id.0)
        .bind(token)
        .bind(password_hash)
        .execute(&mut *transaction)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(id.0)
            .execute(&mut *transaction)
            .await
            .map_err(database_error)?;

        transaction.commit().await.map_err(database_error)?;

        Ok(true)
    }

    async fn mark_for_deletion(
        &self,
        id: &UserId,
        deletion: ScheduledDeletion,
    ) -> Result<(), UserError> {
        self.update_user(
            id,
            sqlx::query("UPDATE users SET deletion_scheduled_at = $2 WHERE id = $1")
                .bind(id.0)
                .bind(deletion.scheduled_at),
        )
        .await
    }

    async fn cancel_scheduled_deletion(&self, id: &UserId) -> Result<bool, UserError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET deletion_scheduled_at = NULL
            WHERE id = $1 AND deletion_scheduled_at IS NOT NULL
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected() > 0)
    }
}
