pub mod permission;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use permission::{Permission, PermissionSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub site_id: Uuid,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, site_id: Uuid, email: impl Into<String>, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user_id,
            site_id,
            email: email.into(),
            exp,
            iat: now.timestamp(),
        }
    }

    pub fn expires_in(&self) -> i64 {
        (self.exp - Utc::now().timestamp()).max(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("JWT secret is not configured")]
    MissingSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

pub fn generate_jwt(claims: &Claims, secret: &str) -> Result<String, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Claims>(token, &decoding_key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
}

/// Hash password for secure storage
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Verify password against stored hash. Malformed hashes count as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("Stored password hash could not be verified: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn jwt_round_trip_keeps_identity() {
        let user_id = Uuid::new_v4();
        let site_id = Uuid::new_v4();
        let claims = Claims::new(user_id, site_id, "sales@example.com", 1);
        let token = generate_jwt(&claims, SECRET).unwrap();

        let decoded = decode_jwt(&token, SECRET).unwrap();
        assert_eq!(decoded.sub, user_id);
        assert_eq!(decoded.site_id, site_id);
        assert!(decoded.expires_in() > 3500);
    }

    #[test]
    fn jwt_rejects_wrong_secret() {
        let claims = Claims::new(Uuid::new_v4(), Uuid::new_v4(), "a@b.co", 1);
        let token = generate_jwt(&claims, SECRET).unwrap();
        assert!(matches!(decode_jwt(&token, "other"), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn jwt_requires_secret() {
        let claims = Claims::new(Uuid::new_v4(), Uuid::new_v4(), "a@b.co", 1);
        assert!(matches!(generate_jwt(&claims, ""), Err(AuthError::MissingSecret)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut claims = Claims::new(Uuid::new_v4(), Uuid::new_v4(), "a@b.co", 1);
        claims.exp = Utc::now().timestamp() - 3600;
        let token = generate_jwt(&claims, SECRET).unwrap();
        assert!(decode_jwt(&token, SECRET).is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
