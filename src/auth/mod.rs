// =============================================================================
// Auth Layer — JWT access/refresh tokens over bcrypt-hashed credentials
// =============================================================================
//
// Generalizes the teacher's single static-token `AuthBearer` extractor
// (`api/auth.rs`) into per-user credentials: register/login issue a bcrypt
// hash, login/refresh issue a signed JWT pair. Refresh tokens rotate on use
// — a durable analogue of the SSE token's single-use discipline.
// =============================================================================

pub mod extractor;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use extractor::AuthUser;

const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Signs and verifies JWTs. Holds the HMAC secret; never logs it.
pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue_access_token(&self, user_id: &str) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(ACCESS_TOKEN_TTL_MINUTES)).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn verify_access_token(&self, token: &str) -> anyhow::Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCodec").field("encoding_key", &"<redacted>").finish()
    }
}

/// A persisted user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: chrono::DateTime<Utc>,
}

/// A persisted refresh token, single-use (rotated) on presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub user_id: String,
    pub expires_at: chrono::DateTime<Utc>,
    pub revoked: bool,
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub fn new_refresh_token(user_id: &str) -> RefreshTokenRecord {
    RefreshTokenRecord {
        token: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        expires_at: Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS),
        revoked: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_with_the_same_codec() {
        let codec = JwtCodec::new("test-secret");
        let token = codec.issue_access_token("user-1").unwrap();
        let claims = codec.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn token_signed_with_a_different_secret_fails_verification() {
        let codec_a = JwtCodec::new("secret-a");
        let codec_b = JwtCodec::new("secret-b");
        let token = codec_a.issue_access_token("user-1").unwrap();
        assert!(codec_b.verify_access_token(&token).is_err());
    }

    #[test]
    fn password_hash_round_trips() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }
}
