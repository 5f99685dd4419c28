use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;

/// Why token verification failed. Expiry is kept separate from every other
/// failure so the session guard can run its cleanup-on-expiry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (account ID).
    pub sub: String,
    /// Identity claim (plaintext email).
    pub email: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Token ID.
    pub jti: String,
}

impl SessionClaims {
    /// Parse the subject back into an account id.
    pub fn account_id(&self) -> Result<Uuid, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Invalid)
    }
}

/// Token payload returned to the client after a successful verification.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Session token issuer: mints and verifies signed, time-limited bearer
/// tokens. Stateless by design; liveness against the session ledger is the
/// guard's job, not this service's.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry_minutes: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            token_expiry_minutes: config.token_expiry_minutes,
        }
    }

    /// Mint a session token bound to an account.
    pub fn mint(&self, account_id: Uuid, email: &str) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.token_expiry_minutes);

        let claims = SessionClaims {
            sub: account_id.to_string(),
            email: email.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode session token: {}", e))
    }

    /// Verify integrity first, then expiry.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(TokenError::Expired),
                _ => Err(TokenError::Invalid),
            },
        }
    }

    /// Decode claims with the expiry check disabled. The signature is still
    /// enforced; only the guard's expiry-cleanup path uses this.
    pub fn claims_ignoring_expiry(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Invalid)
    }

    /// Token lifetime in seconds (for client info).
    pub fn expiry_seconds(&self) -> i64 {
        self.token_expiry_minutes * 60
    }

    pub fn token_response(&self, access_token: String) -> TokenResponse {
        TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.expiry_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(expiry_minutes: i64) -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-secret-do-not-use-in-prod".to_string(),
            token_expiry_minutes: expiry_minutes,
        })
    }

    #[test]
    fn test_mint_and_verify() {
        let jwt = service(60);
        let account_id = Uuid::new_v4();

        let token = jwt.mint(account_id, "alice@example.com").expect("mint");
        let claims = jwt.verify(&token).expect("verify");

        assert_eq!(claims.account_id().expect("uuid"), account_id);
        assert_eq!(claims.email, "alice@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_tampered_token_is_invalid() {
        let jwt = service(60);
        let token = jwt.mint(Uuid::new_v4(), "alice@example.com").expect("mint");

        let mut tampered = token.clone();
        tampered.pop();
        tampered.push('A');

        assert_eq!(jwt.verify(&tampered), Err(TokenError::Invalid));
        assert_eq!(jwt.verify("not-a-jwt"), Err(TokenError::Invalid));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let jwt = service(60);
        let other = JwtService::new(&JwtConfig {
            secret: "another-secret".to_string(),
            token_expiry_minutes: 60,
        });

        let token = jwt.mint(Uuid::new_v4(), "alice@example.com").expect("mint");
        assert_eq!(other.verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_expired_token_reports_expired() {
        // Negative lifetime puts exp in the past.
        let jwt = service(-5);
        let account_id = Uuid::new_v4();
        let token = jwt.mint(account_id, "alice@example.com").expect("mint");

        assert_eq!(jwt.verify(&token), Err(TokenError::Expired));

        // Cleanup path can still read the claims.
        let claims = jwt.claims_ignoring_expiry(&token).expect("claims");
        assert_eq!(claims.account_id().expect("uuid"), account_id);
    }
}
