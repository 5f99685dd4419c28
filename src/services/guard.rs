//! Session activity guard: the per-request gate behind every protected
//! operation.
//!
//! Token expiry alone cannot express server-side revocation, so a
//! cryptographically valid token is additionally checked against the
//! ledger's notion of "currently active". Logout works by removing that
//! liveness, not by invalidating the token itself.

use std::sync::Arc;

use crate::models::AccountResponse;
use crate::services::crypto::IdentityCipher;
use crate::services::error::AuthError;
use crate::services::jwt::{JwtService, TokenError};
use crate::services::ledger::SessionLedger;
use crate::services::store::CredentialStore;

#[derive(Clone)]
pub struct SessionGuard {
    jwt: JwtService,
    store: Arc<dyn CredentialStore>,
    ledger: Arc<dyn SessionLedger>,
    cipher: IdentityCipher,
}

impl SessionGuard {
    pub fn new(
        jwt: JwtService,
        store: Arc<dyn CredentialStore>,
        ledger: Arc<dyn SessionLedger>,
        cipher: IdentityCipher,
    ) -> Self {
        Self {
            jwt,
            store,
            ledger,
            cipher,
        }
    }

    /// Validate a presented token and return the sanitized account behind it.
    ///
    /// Order of checks: signature/expiry first, then ledger liveness. A
    /// structurally valid token with no active attempt is rejected. On
    /// expiry specifically, every active attempt for the token's account is
    /// closed before returning, so stale sessions reconcile themselves the
    /// next time the client shows up.
    pub async fn authenticate(&self, token: &str) -> Result<AccountResponse, AuthError> {
        let claims = match self.jwt.verify(token) {
            Ok(claims) => claims,
            Err(TokenError::Expired) => {
                self.close_expired(token).await;
                return Err(AuthError::Unauthorized("session expired"));
            }
            Err(TokenError::Invalid) => {
                return Err(AuthError::Unauthorized("invalid token"));
            }
        };

        let account_id = claims
            .account_id()
            .map_err(|_| AuthError::Unauthorized("invalid token"))?;

        if self.ledger.find_active(account_id).await?.is_none() {
            return Err(AuthError::Unauthorized("session not active"));
        }

        let account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::Unauthorized("invalid token"))?;

        let email = self
            .cipher
            .decrypt(&account.email_enc)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!(e)))?;

        Ok(account.sanitized(email))
    }

    /// Cleanup-on-expiry. Best effort: the caller gets `Unauthorized` either
    /// way, so a storage hiccup here is logged rather than surfaced.
    async fn close_expired(&self, token: &str) {
        let Ok(claims) = self.jwt.claims_ignoring_expiry(token) else {
            return;
        };
        let Ok(account_id) = claims.account_id() else {
            return;
        };

        match self.ledger.close_all_active(account_id).await {
            Ok(closed) if closed > 0 => {
                tracing::info!(%account_id, closed, "Closed active sessions for expired token");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%account_id, error = %e, "Expiry cleanup failed");
            }
        }
    }
}
