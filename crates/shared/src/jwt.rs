//! Operator access token utilities.
//!
//! Operator tokens are issued by the external identity service and signed
//! with RS256. This backend only validates them; issuing is kept for tests
//! and local tooling.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error type for JWT operations.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    EncodingError(String),

    #[error("Failed to decode token: {0}")]
    DecodingError(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Operator token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (numeric user ID as string)
    pub sub: String,
    /// Operator role: admin, operator or viewer
    pub role: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

/// Default leeway in seconds for clock skew tolerance
pub const DEFAULT_LEEWAY_SECS: u64 = 30;

/// Validates operator access tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    /// Leeway in seconds for clock skew tolerance
    pub leeway_secs: u64,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithm", &self.algorithm)
            .field("leeway_secs", &self.leeway_secs)
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl TokenVerifier {
    /// Creates a verifier from an RSA public key in PEM format.
    pub fn from_rsa_pem(public_key_pem: &str, leeway_secs: u64) -> Result<Self, JwtError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::InvalidKey(format!("Invalid public key: {}", e)))?;

        Ok(Self {
            decoding_key,
            algorithm: Algorithm::RS256,
            leeway_secs,
        })
    }

    /// Creates an HS256 verifier. Only meant for tests.
    pub fn from_secret(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
            leeway_secs: 0,
        }
    }

    /// Validates a token and returns its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = self.leeway_secs;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidToken,
                _ => JwtError::DecodingError(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }
}

/// Issues operator access tokens.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    algorithm: Algorithm,
    /// Access token expiration in seconds
    pub expiry_secs: i64,
}

impl TokenIssuer {
    /// Creates an issuer from an RSA private key in PEM format.
    pub fn from_rsa_pem(private_key_pem: &str, expiry_secs: i64) -> Result<Self, JwtError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| JwtError::InvalidKey(format!("Invalid private key: {}", e)))?;

        Ok(Self {
            encoding_key,
            algorithm: Algorithm::RS256,
            expiry_secs,
        })
    }

    /// Creates an HS256 issuer. Only meant for tests.
    pub fn from_secret(secret: &str, expiry_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
            expiry_secs,
        }
    }

    /// Issues a token for the given user id and role.
    pub fn issue(&self, user_id: i64, role: &str) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            exp: (now + Duration::seconds(self.expiry_secs)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))
    }
}

/// Extracts the numeric user ID from validated claims.
pub fn extract_user_id(claims: &Claims) -> Result<i64, JwtError> {
    claims.sub.parse::<i64>().map_err(|_| JwtError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key_for_jwt_testing_12345";

    #[test]
    fn test_issue_and_validate() {
        let issuer = TokenIssuer::from_secret(SECRET, 900);
        let verifier = TokenVerifier::from_secret(SECRET);

        let token = issuer.issue(42, "admin").unwrap();
        let claims = verifier.validate(&token).unwrap();

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, "admin");
        assert_eq!(extract_user_id(&claims).unwrap(), 42);
    }

    #[test]
    fn test_expired_token() {
        let issuer = TokenIssuer::from_secret(SECRET, -120);
        let verifier = TokenVerifier::from_secret(SECRET);

        let token = issuer.issue(7, "viewer").unwrap();
        let result = verifier.validate(&token);
        assert!(
            matches!(result, Err(JwtError::TokenExpired)),
            "Expected TokenExpired, got: {:?}",
            result
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = TokenIssuer::from_secret("another_secret_entirely_000000", 900);
        let verifier = TokenVerifier::from_secret(SECRET);

        let token = issuer.issue(1, "admin").unwrap();
        assert!(matches!(
            verifier.validate(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_malformed_token() {
        let verifier = TokenVerifier::from_secret(SECRET);
        assert!(verifier.validate("not_a_jwt").is_err());
    }

    #[test]
    fn test_non_numeric_subject() {
        let claims = Claims {
            sub: "not-a-number".to_string(),
            role: "admin".to_string(),
            exp: 0,
            iat: 0,
            jti: String::new(),
        };
        assert!(matches!(
            extract_user_id(&claims),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_invalid_rsa_key() {
        assert!(matches!(
            TokenVerifier::from_rsa_pem("not a pem", 30),
            Err(JwtError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_jwt_error_display() {
        assert!(format!("{}", JwtError::TokenExpired).contains("expired"));
        assert!(format!("{}", JwtError::InvalidToken).contains("Invalid"));
    }
}
