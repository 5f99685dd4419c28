//! Authentication state machine.
//!
//! Orchestrates the register -> login -> verify -> authenticated -> logout
//! flow over the credential store, session ledger, one-time code engine,
//! token issuer and email dispatch. Per account the observable states are
//! Anonymous -> PendingMfa -> Authenticated -> Ended; the ledger's
//! conditional updates keep the transitions monotonic under concurrency.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Account, AccountResponse, ClientInfo, LoginAttempt};
use crate::services::crypto::IdentityCipher;
use crate::services::email::EmailProvider;
use crate::services::error::AuthError;
use crate::services::guard::SessionGuard;
use crate::services::jwt::{JwtService, TokenResponse};
use crate::services::ledger::SessionLedger;
use crate::services::otp::{self, CodeCheck};
use crate::services::store::CredentialStore;
use crate::utils::{hash_password, verify_password, Password, Verifier};

/// Payload returned after a successful code verification.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub account: AccountResponse,
    pub token: TokenResponse,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    ledger: Arc<dyn SessionLedger>,
    email: Arc<dyn EmailProvider>,
    jwt: JwtService,
    cipher: IdentityCipher,
    guard: SessionGuard,
    code_ttl_minutes: i64,
    /// Verifier for a password nobody holds; checked when the identity is
    /// unknown so both credential failures cost the same.
    dummy_verifier: Verifier,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        ledger: Arc<dyn SessionLedger>,
        email: Arc<dyn EmailProvider>,
        jwt: JwtService,
        cipher: IdentityCipher,
        code_ttl_minutes: i64,
    ) -> Result<Self, anyhow::Error> {
        let dummy_verifier = hash_password(&Password::new(Uuid::new_v4().to_string()))?;
        let guard = SessionGuard::new(
            jwt.clone(),
            Arc::clone(&store),
            Arc::clone(&ledger),
            cipher.clone(),
        );

        Ok(Self {
            store,
            ledger,
            email,
            jwt,
            cipher,
            guard,
            code_ttl_minutes,
            dummy_verifier,
        })
    }

    /// Register a new account. No session side effects.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Uuid, AuthError> {
        let identity = normalize_identity(email);

        let verifier = hash_password(&Password::new(password.to_string()))
            .map_err(AuthError::Internal)?;
        let email_enc = self
            .cipher
            .encrypt(&identity)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!(e)))?;
        let email_lookup = self.cipher.lookup_digest(&identity);

        let account = Account::new(
            email_enc,
            email_lookup,
            verifier.into_string(),
            display_name.to_string(),
        );
        let account_id = account.account_id;

        // Duplicate detection happens inside the store, under its own
        // atomicity guarantee.
        self.store.insert(&account).await?;

        tracing::info!(%account_id, "Account registered");
        Ok(account_id)
    }

    /// First login step: check the password, mint a one-time code, open a
    /// pending attempt and dispatch the code. Anonymous -> PendingMfa.
    ///
    /// A repeated login while another attempt is pending creates a new,
    /// independent attempt; the old one goes stale and is reconciled at
    /// logout or expiry cleanup. Verification is keyed strictly by the
    /// returned attempt id.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: ClientInfo,
    ) -> Result<Uuid, AuthError> {
        let identity = normalize_identity(email);
        let lookup = self.cipher.lookup_digest(&identity);

        let account = self.store.find_by_lookup(&lookup).await?;

        // Unknown identity and wrong password must be indistinguishable.
        // The dummy check keeps the work comparable on both paths.
        let account = match account {
            Some(account) => account,
            None => {
                let presented = Password::new(password.to_string());
                let _ = verify_password(&presented, &self.dummy_verifier);
                return Err(AuthError::InvalidCredentials);
            }
        };

        let presented = Password::new(password.to_string());
        let stored = Verifier::new(account.password_hash.clone());
        verify_password(&presented, &stored).map_err(|_| AuthError::InvalidCredentials)?;

        let code = otp::generate();
        let attempt = LoginAttempt::new(
            account.account_id,
            client,
            code.clone(),
            Utc::now() + Duration::minutes(self.code_ttl_minutes),
        );
        let attempt_id = attempt.attempt_id;

        self.ledger.insert(&attempt).await?;

        tracing::info!(
            account_id = %account.account_id,
            %attempt_id,
            client_ip = %attempt.client_ip,
            "Login attempt opened, dispatching code"
        );

        // The attempt must survive a failed dispatch; the id is surfaced so
        // the caller can arrange a resend out of band.
        if let Err(e) = self.email.send_login_code(&identity, &code).await {
            tracing::warn!(%attempt_id, error = %e, "Code delivery failed");
            return Err(AuthError::DeliveryFailed { attempt_id });
        }

        Ok(attempt_id)
    }

    /// Second login step: validate the code against its attempt and mint a
    /// session token. PendingMfa -> Authenticated.
    pub async fn verify_code(
        &self,
        attempt_id: Uuid,
        presented_code: &str,
    ) -> Result<AuthResponse, AuthError> {
        let attempt = self
            .ledger
            .find_by_id(attempt_id)
            .await?
            .ok_or(AuthError::InvalidCode)?;

        match otp::validate(&attempt, presented_code, Utc::now()) {
            CodeCheck::Valid => {}
            CodeCheck::Invalid | CodeCheck::Expired => return Err(AuthError::InvalidCode),
        }

        // Single-use flip: only one concurrent caller can commit the
        // pending -> active transition; losers observe a replay.
        if !self.ledger.mark_succeeded(attempt_id).await? {
            return Err(AuthError::InvalidCode);
        }

        self.store.touch_last_login(attempt.account_id).await?;

        let account = self
            .store
            .find_by_id(attempt.account_id)
            .await?
            .ok_or_else(|| {
                AuthError::Internal(anyhow::anyhow!(
                    "account {} missing for verified attempt",
                    attempt.account_id
                ))
            })?;

        let email = self
            .cipher
            .decrypt(&account.email_enc)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!(e)))?;

        let access_token = self
            .jwt
            .mint(account.account_id, &email)
            .map_err(AuthError::Internal)?;

        tracing::info!(account_id = %account.account_id, %attempt_id, "Authentication complete");

        Ok(AuthResponse {
            account: account.sanitized(email),
            token: self.jwt.token_response(access_token),
        })
    }

    /// End the account's session. Authenticated -> Ended. Idempotent: no
    /// active attempt is not an error.
    pub async fn logout(&self, account_id: Uuid) -> Result<(), AuthError> {
        if let Some(active) = self.ledger.find_active(account_id).await? {
            if !self.ledger.close(active.attempt_id).await? {
                // Lost a race against another transition; nothing to undo.
                tracing::debug!(attempt_id = %active.attempt_id, "Attempt already closed");
            }
        }

        // A prior crash can leave extra active rows behind; sweep them too.
        let stale = self.ledger.close_all_active(account_id).await?;
        if stale > 0 {
            tracing::info!(%account_id, stale, "Closed stale active attempts at logout");
        }

        tracing::info!(%account_id, "Logged out");
        Ok(())
    }

    /// Resolve a presented token to the account behind it.
    pub async fn current_user(&self, token: &str) -> Result<AccountResponse, AuthError> {
        self.guard.authenticate(token).await
    }

    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }
}

/// Identities are compared in normalized form: trimmed and lowercased.
pub fn normalize_identity(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identity() {
        assert_eq!(
            normalize_identity("  Alice@Example.COM "),
            "alice@example.com"
        );
        assert_eq!(normalize_identity("bob@example.com"), "bob@example.com");
    }
}
