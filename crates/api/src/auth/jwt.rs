//! JWT validation for staff and admin identities
//!
//! Tokens are minted upstream by the identity provider; this service only
//! verifies them. `generate_token` exists for the `issue-staff-token` tool and
//! for tests.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use helpline_shared::ParticipantRole;

/// Claims carried by a staff token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffClaims {
    /// Staff identity
    pub sub: String,
    /// Display name shown to callers and other staff
    pub name: String,
    /// `staff` or `admin`
    pub role: ParticipantRole,
    pub iat: i64,
    pub exp: i64,
}

/// JWT manager for token operations
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign a token for `staff_id` valid for `ttl`
    pub fn generate_token(
        &self,
        staff_id: &str,
        name: &str,
        role: ParticipantRole,
        ttl: Duration,
    ) -> Result<String, JwtError> {
        if !role.is_staff() {
            return Err(JwtError::NotStaff);
        }

        let now = OffsetDateTime::now_utc();
        let claims = StaffClaims {
            sub: staff_id.to_string(),
            name: name.to_string(),
            role,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Validate and decode a token. Only staff and admin tokens are accepted.
    pub fn validate_token(&self, token: &str) -> Result<StaffClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // clock skew tolerance, seconds

        let claims = decode::<StaffClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })?;

        if !claims.role.is_staff() {
            return Err(JwtError::NotStaff);
        }
        if claims.sub.trim().is_empty() {
            return Err(JwtError::Invalid);
        }

        Ok(claims)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token does not belong to staff")]
    NotStaff,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}
