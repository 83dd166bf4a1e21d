use {
    super::repository::Repository,
    crate::{
        api::RestError,
        auth::{
            self,
            TokenIssuer,
        },
        kernel::db::DB,
        models,
    },
    time::{
        OffsetDateTime,
        PrimitiveDateTime,
        UtcOffset,
    },
    uuid::Uuid,
};

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 100;
const MIN_PASSWORD_LENGTH: usize = 8;

pub struct RegisterInput {
    pub username: String,
    pub email:    String,
    pub password: String,
}

pub struct LoginInput {
    pub username: String,
    pub password: String,
}

pub struct RefreshInput {
    pub refresh_token: String,
}

pub struct LogoutInput {
    pub refresh_token: String,
    pub caller_id:     crate::kernel::entities::UserId,
}

/// An access/refresh pair as handed to the client. The access token is a
/// signed JWT; the refresh token is opaque and single-use.
#[derive(Debug)]
pub struct IssuedTokens {
    pub access_token:  String,
    pub refresh_token: String,
    pub expires_in:    i64,
}

pub struct ServiceInner {
    repo:         Repository,
    token_issuer: std::sync::Arc<TokenIssuer>,
}

#[derive(Clone)]
pub struct Service(std::sync::Arc<ServiceInner>);
impl std::ops::Deref for Service {
    type Target = ServiceInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Service {
    pub fn new(db: DB, token_issuer: std::sync::Arc<TokenIssuer>) -> Self {
        Self(std::sync::Arc::new(ServiceInner {
            repo: Repository::from(db),
            token_issuer,
        }))
    }
}

fn naive(datetime: OffsetDateTime) -> PrimitiveDateTime {
    let utc = datetime.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

impl ServiceInner {
    #[tracing::instrument(skip_all, fields(username = %input.username), err(level = tracing::Level::TRACE))]
    pub async fn register(&self, input: RegisterInput) -> Result<models::User, RestError> {
        let mut errors = Vec::new();
        let username = input.username.trim().to_string();
        if username.len() < MIN_USERNAME_LENGTH || username.len() > MAX_USERNAME_LENGTH {
            errors.push(format!(
                "username must be between {} and {} characters",
                MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
            ));
        }
        let email = match models::WrappedEmailAddress::try_from(input.email.clone()) {
            Ok(email) => Some(email),
            Err(_) => {
                errors.push("email is not a valid address".to_string());
                None
            }
        };
        if input.password.len() < MIN_PASSWORD_LENGTH {
            errors.push(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            ));
        }
        let Some(email) = email else {
            return Err(RestError::Validation(errors));
        };
        if !errors.is_empty() {
            return Err(RestError::Validation(errors));
        }

        let password_hash = auth::hash_password(&input.password).map_err(|e| {
            tracing::error!(error = ?e, "Password hashing failed");
            RestError::Unknown
        })?;
        let now = naive(OffsetDateTime::now_utc());
        let user = models::User {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            created_at: now,
            updated_at: now,
        };
        self.repo.db.add_user(&user).await?;
        Ok(user)
    }

    #[tracing::instrument(skip_all, fields(username = %input.username), err(level = tracing::Level::TRACE))]
    pub async fn login(&self, input: LoginInput) -> Result<IssuedTokens, RestError> {
        let user = self
            .repo
            .db
            .get_user_by_username(input.username.trim())
            .await?
            .ok_or(RestError::Unauthorized)?;
        // Same rejection for unknown user and wrong password.
        if !auth::verify_password(&input.password, &user.password_hash) {
            return Err(RestError::Unauthorized);
        }
        self.issue_tokens(&user).await
    }

    /// Single-use rotation: the presented token is revoked and replaced.
    /// Presenting an already-revoked token revokes the owner's whole
    /// outstanding family, cutting off whoever replayed it.
    #[tracing::instrument(skip_all, err(level = tracing::Level::TRACE))]
    pub async fn refresh(&self, input: RefreshInput) -> Result<IssuedTokens, RestError> {
        let presented = self
            .repo
            .db
            .get_refresh_token(&input.refresh_token)
            .await?
            .ok_or(RestError::Unauthorized)?;
        let now = OffsetDateTime::now_utc();

        if presented.revoked_at.is_some() {
            tracing::warn!(
                user_id = presented.user_id.to_string(),
                "Revoked refresh token replayed; revoking the owner's token family"
            );
            self.repo
                .db
                .revoke_all_refresh_tokens(presented.user_id, now)
                .await?;
            return Err(RestError::Unauthorized);
        }
        if !presented.is_usable(naive(now)) {
            return Err(RestError::Unauthorized);
        }

        let user = self
            .repo
            .db
            .get_user(presented.user_id)
            .await?
            .ok_or(RestError::Unauthorized)?;
        let replacement = new_refresh_token(user.id, now);
        let rotated = self
            .repo
            .db
            .rotate_refresh_token(presented.id, &replacement, now)
            .await?;
        if !rotated {
            // Lost a race with another rotation of the same token: that is
            // a reuse by definition.
            self.repo
                .db
                .revoke_all_refresh_tokens(presented.user_id, now)
                .await?;
            return Err(RestError::Unauthorized);
        }

        let access_token = self
            .token_issuer
            .issue(user.id, &user.username)
            .map_err(|e| {
                tracing::error!(error = ?e, "Failed to issue access token");
                RestError::Unknown
            })?;
        Ok(IssuedTokens {
            access_token,
            refresh_token: replacement.token,
            expires_in: auth::ACCESS_TOKEN_LIFETIME.whole_seconds(),
        })
    }

    /// Idempotent: revokes the presented refresh token when it belongs to
    /// the caller; an unknown or foreign token changes nothing.
    #[tracing::instrument(skip_all, err(level = tracing::Level::TRACE))]
    pub async fn logout(&self, input: LogoutInput) -> Result<(), RestError> {
        if let Some(token) = self.repo.db.get_refresh_token(&input.refresh_token).await? {
            if token.user_id == input.caller_id {
                self.repo
                    .db
                    .revoke_refresh_token(token.id, OffsetDateTime::now_utc())
                    .await?;
            }
        }
        Ok(())
    }

    async fn issue_tokens(&self, user: &models::User) -> Result<IssuedTokens, RestError> {
        let access_token = self
            .token_issuer
            .issue(user.id, &user.username)
            .map_err(|e| {
                tracing::error!(error = ?e, "Failed to issue access token");
                RestError::Unknown
            })?;
        let refresh = new_refresh_token(user.id, OffsetDateTime::now_utc());
        self.repo.db.add_refresh_token(&refresh).await?;
        Ok(IssuedTokens {
            access_token,
            refresh_token: refresh.token,
            expires_in: auth::ACCESS_TOKEN_LIFETIME.whole_seconds(),
        })
    }
}

fn new_refresh_token(
    user_id: crate::kernel::entities::UserId,
    now: OffsetDateTime,
) -> models::RefreshToken {
    models::RefreshToken {
        id:         Uuid::new_v4(),
        user_id,
        token:      auth::generate_refresh_token(),
        expires_at: naive(auth::refresh_token_expiry(now)),
        revoked_at: None,
        created_at: naive(now),
    }
}
