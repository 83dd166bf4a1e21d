#[cfg(test)]
use mockall::automock;
use {
    crate::{
        api::RestError,
        kernel::{
            db::DB,
            entities::UserId,
        },
        models,
    },
    async_trait::async_trait,
    std::{
        fmt::Debug,
        sync::Arc,
    },
    time::{
        OffsetDateTime,
        PrimitiveDateTime,
        UtcOffset,
    },
};

fn naive(datetime: OffsetDateTime) -> PrimitiveDateTime {
    let utc = datetime.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

fn internal(context: &str, e: sqlx::Error) -> RestError {
    tracing::error!(error = e.to_string(), "DB: {} failed", context);
    RestError::TemporarilyUnavailable
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Database: Debug + Send + Sync + 'static {
    async fn add_user(&self, user: &models::User) -> Result<(), RestError>;
    async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<models::User>, RestError>;
    async fn get_user(&self, user_id: UserId) -> Result<Option<models::User>, RestError>;
    async fn add_refresh_token(&self, token: &models::RefreshToken) -> Result<(), RestError>;
    async fn get_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<models::RefreshToken>, RestError>;
    /// Revokes the presented token and stores its replacement in one
    /// transaction. Returns `false` without writing when the presented
    /// token was already revoked, which is the token-reuse signal.
    async fn rotate_refresh_token(
        &self,
        presented: models::RefreshTokenId,
        replacement: &models::RefreshToken,
        now: OffsetDateTime,
    ) -> Result<bool, RestError>;
    async fn revoke_refresh_token(
        &self,
        token_id: models::RefreshTokenId,
        now: OffsetDateTime,
    ) -> Result<(), RestError>;
    async fn revoke_all_refresh_tokens(
        &self,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> Result<u64, RestError>;
}

#[derive(Debug)]
pub struct Repository {
    pub db: Arc<dyn Database>,
}

impl Repository {
    pub fn new(db: impl Database) -> Self {
        Self { db: Arc::new(db) }
    }
}

impl From<DB> for Repository {
    fn from(db: DB) -> Self {
        Self::new(db)
    }
}

#[async_trait]
impl Database for DB {
    async fn add_user(&self, user: &models::User) -> Result<(), RestError> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(user.email.value.as_str())
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(self)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RestError::BusinessRule(
                    "Username or email is already registered".to_string(),
                )
            } else {
                internal("insert user", e)
            }
        })?;
        Ok(())
    }

    async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<models::User>, RestError> {
        sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self)
            .await
            .map_err(|e| internal("get user by username", e))
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<models::User>, RestError> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self)
            .await
            .map_err(|e| internal("get user", e))
    }

    async fn add_refresh_token(&self, token: &models::RefreshToken) -> Result<(), RestError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token, expires_at, revoked_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token)
        .bind(token.expires_at)
        .bind(token.revoked_at)
        .bind(token.created_at)
        .execute(self)
        .await
        .map_err(|e| internal("insert refresh token", e))?;
        Ok(())
    }

    async fn get_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<models::RefreshToken>, RestError> {
        sqlx::query_as("SELECT * FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .fetch_optional(self)
            .await
            .map_err(|e| internal("get refresh token", e))
    }

    async fn rotate_refresh_token(
        &self,
        presented: models::RefreshTokenId,
        replacement: &models::RefreshToken,
        now: OffsetDateTime,
    ) -> Result<bool, RestError> {
        let mut tx = self
            .begin()
            .await
            .map_err(|e| internal("begin rotation transaction", e))?;
        // Guarded on revoked_at so two racing refreshes of the same token
        // cannot both rotate; the loser reads back as a reuse attempt.
        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL",
        )
        .bind(naive(now))
        .bind(presented)
        .execute(&mut *tx)
        .await
        .map_err(|e| internal("revoke presented token", e))?;
        if revoked.rows_affected() == 0 {
            return Ok(false);
        }
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token, expires_at, revoked_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(replacement.id)
        .bind(replacement.user_id)
        .bind(&replacement.token)
        .bind(replacement.expires_at)
        .bind(replacement.revoked_at)
        .bind(replacement.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| internal("insert replacement token", e))?;
        tx.commit()
            .await
            .map_err(|e| internal("commit rotation transaction", e))?;
        Ok(true)
    }

    async fn revoke_refresh_token(
        &self,
        token_id: models::RefreshTokenId,
        now: OffsetDateTime,
    ) -> Result<(), RestError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $1 WHERE id = $2 AND revoked_at IS NULL",
        )
        .bind(naive(now))
        .bind(token_id)
        .execute(self)
        .await
        .map_err(|e| internal("revoke refresh token", e))?;
        Ok(())
    }

    async fn revoke_all_refresh_tokens(
        &self,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> Result<u64, RestError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $1 WHERE user_id = $2 AND revoked_at IS NULL",
        )
        .bind(naive(now))
        .bind(user_id)
        .execute(self)
        .await
        .map_err(|e| internal("revoke all refresh tokens", e))?;
        Ok(result.rows_affected())
    }
}
