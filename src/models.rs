use {
    crate::kernel::entities::UserId,
    sqlx::{
        prelude::FromRow,
        types::time::PrimitiveDateTime,
    },
    std::str::FromStr,
    uuid::Uuid,
};

#[derive(Clone, Debug)]
pub struct WrappedEmailAddress {
    pub value: email_address::EmailAddress,
}

impl WrappedEmailAddress {
    pub fn new(value: email_address::EmailAddress) -> Self {
        WrappedEmailAddress { value }
    }
}

impl TryFrom<String> for WrappedEmailAddress {
    type Error = email_address::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = email_address::EmailAddress::from_str(value.as_str())?;
        Ok(WrappedEmailAddress::new(value))
    }
}

#[derive(Clone, Debug, FromRow)]
pub struct User {
    pub id:            UserId,
    pub username:      String,
    #[sqlx(try_from = "String")]
    pub email:         WrappedEmailAddress,
    pub password_hash: String,

    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

pub type RefreshTokenId = Uuid;

/// A single-use refresh token. `revoked_at` is set when the token is rotated,
/// explicitly logged out, or swept up in a reuse-defense family revocation.
#[derive(Clone, Debug, FromRow)]
pub struct RefreshToken {
    pub id:         RefreshTokenId,
    pub user_id:    UserId,
    pub token:      String,
    pub expires_at: PrimitiveDateTime,
    pub revoked_at: Option<PrimitiveDateTime>,
    pub created_at: PrimitiveDateTime,
}

impl RefreshToken {
    pub fn is_usable(&self, now: PrimitiveDateTime) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}
