use {
    crate::{
        config::AuthOptions,
        kernel::entities::UserId,
        models,
    },
    anyhow::anyhow,
    base64::{
        engine::general_purpose::URL_SAFE_NO_PAD,
        Engine,
    },
    jsonwebtoken::{
        decode,
        encode,
        DecodingKey,
        EncodingKey,
        Header,
        Validation,
    },
    rand::RngCore,
    serde::{
        Deserialize,
        Serialize,
    },
    time::{
        Duration,
        OffsetDateTime,
    },
};

pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::minutes(15);
pub const REFRESH_TOKEN_LIFETIME: Duration = Duration::days(7);

const MIN_SECRET_KEY_LENGTH: usize = 32;
const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub:      UserId,
    pub username: String,
    pub iss:      String,
    pub aud:      String,
    pub iat:      i64,
    pub exp:      i64,
}

/// Signs and verifies the short-lived bearer access tokens. Refresh tokens
/// are opaque and live in the store; only access tokens are self-contained.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation:   Validation,
    issuer:       String,
    audience:     String,
}

impl TokenIssuer {
    pub fn new(options: &AuthOptions) -> anyhow::Result<Self> {
        if options.jwt_secret_key.len() < MIN_SECRET_KEY_LENGTH {
            return Err(anyhow!(
                "JWT secret key must be at least {} characters",
                MIN_SECRET_KEY_LENGTH
            ));
        }
        let mut validation = Validation::default();
        validation.set_issuer(&[options.jwt_issuer.clone()]);
        validation.set_audience(&[options.jwt_audience.clone()]);
        Ok(Self {
            encoding_key: EncodingKey::from_secret(options.jwt_secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(options.jwt_secret_key.as_bytes()),
            validation,
            issuer: options.jwt_issuer.clone(),
            audience: options.jwt_audience.clone(),
        })
    }

    pub fn issue(&self, user_id: UserId, username: &str) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub:      user_id,
            username: username.to_string(),
            iss:      self.issuer.clone(),
            aud:      self.audience.clone(),
            iat:      now.unix_timestamp(),
            exp:      (now + ACCESS_TOKEN_LIFETIME).unix_timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to sign access token: {:?}", e))
    }

    pub fn verify(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .ok()
    }
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| anyhow!("Failed to hash password: {:?}", e))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}

/// Opaque, URL-safe, 256 bits of entropy.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn refresh_token_expiry(now: OffsetDateTime) -> OffsetDateTime {
    now + REFRESH_TOKEN_LIFETIME
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        uuid::Uuid,
    };

    fn test_options() -> AuthOptions {
        AuthOptions {
            jwt_secret_key: "0123456789abcdef0123456789abcdef".to_string(),
            jwt_issuer:     "gavel-server".to_string(),
            jwt_audience:   "gavel-clients".to_string(),
        }
    }

    #[test]
    fn rejects_short_secret() {
        let mut options = test_options();
        options.jwt_secret_key = "too-short".to_string();
        assert!(TokenIssuer::new(&options).is_err());
    }

    #[test]
    fn issued_token_round_trips() {
        let issuer = TokenIssuer::new(&test_options()).unwrap();
        let user_id = Uuid::new_v4();
        let token = issuer.issue(user_id, "alice").unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn rejects_token_from_other_issuer() {
        let issuer = TokenIssuer::new(&test_options()).unwrap();
        let mut other_options = test_options();
        other_options.jwt_issuer = "someone-else".to_string();
        let other = TokenIssuer::new(&other_options).unwrap();
        let token = other.issue(Uuid::new_v4(), "mallory").unwrap();
        assert!(issuer.verify(&token).is_none());
    }

    #[test]
    fn password_hash_round_trips() {
        let hash = hash_password("hunter2-hunter2").unwrap();
        assert!(verify_password("hunter2-hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn refresh_tokens_are_unique() {
        assert_ne!(generate_refresh_token(), generate_refresh_token());
    }
}
