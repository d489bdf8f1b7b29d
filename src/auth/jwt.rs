//! Session tokens: HS256 JWTs carrying the user id, email and role.

use crate::domain::Role;
use crate::error::AuthError;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Payload stored in the session token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Signing and verification keys plus token lifetime.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        JwtKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn issue(&self, user_id: Uuid, email: &str, role: Role) -> Result<String, AuthError> {
        let now = unix_now()?;
        self.encode(&Claims {
            user_id,
            email: email.to_string(),
            role,
            iat: now,
            exp: now + self.ttl_secs,
        })
    }

    fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding).map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify signature and expiry (no leeway) and return the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature => AuthError::InvalidToken("bad signature"),
                _ => AuthError::InvalidToken("malformed"),
            })
    }
}

fn unix_now() -> Result<u64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AuthError::Signing(format!("system time error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters-long";

    #[test]
    fn issue_and_verify() {
        let keys = JwtKeys::new(SECRET, 3600);
        let id = Uuid::new_v4();
        let token = keys.issue(id, "a@example.com", Role::Admin).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.user_id, id);
        assert_eq!(claims.email, "a@example.com");
        assert!(claims.is_admin());
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn rejects_other_secret() {
        let token = JwtKeys::new(SECRET, 60).issue(Uuid::new_v4(), "a@b.c", Role::User).unwrap();
        let other = JwtKeys::new("another-secret-that-is-also-32-characters", 60);
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn rejects_expired() {
        let keys = JwtKeys::new(SECRET, 60);
        let token = keys
            .encode(&Claims {
                user_id: Uuid::new_v4(),
                email: "a@b.c".into(),
                role: Role::User,
                iat: 1_000,
                exp: 2_000,
            })
            .unwrap();
        assert!(matches!(keys.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn rejects_garbage() {
        let keys = JwtKeys::new(SECRET, 60);
        assert!(matches!(keys.verify("not.a.jwt"), Err(AuthError::InvalidToken(_))));
    }
}
