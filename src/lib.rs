//! MFA-gated credential and session authentication core.
//!
//! Implements the register -> login -> verify-code -> authenticated ->
//! logout flow: password login opens a pending attempt in a session ledger
//! and emails a one-time code; verifying the code activates the attempt and
//! mints a signed bearer token; every later request is gated on both the
//! token and the ledger's active attempt, which is how logout revokes
//! otherwise-stateless tokens.
//!
//! HTTP routing, CORS and rate limiting are the embedding service's
//! concern; this crate exposes [`services::AuthService`] (the state
//! machine) and [`services::SessionGuard`] (the per-request gate) as plain
//! async operations with typed errors.

pub mod config;
pub mod db;
pub mod models;
pub mod observability;
pub mod services;
pub mod utils;

use std::sync::Arc;

use config::AppConfig;
use services::{
    AuthService, IdentityCipher, JwtService, PgCredentialStore, PgSessionLedger, SmtpEmailService,
};

/// Wire the production collaborators from configuration: connect the pool,
/// run migrations and construct the state machine. Call once at process
/// start; every collaborator is injected from here, never reached through a
/// global.
pub async fn bootstrap(config: &AppConfig) -> Result<AuthService, anyhow::Error> {
    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(PgCredentialStore::new(pool.clone()));
    let ledger = Arc::new(PgSessionLedger::new(pool));
    let email = Arc::new(SmtpEmailService::new(&config.smtp)?);
    let jwt = JwtService::new(&config.jwt);
    let cipher = IdentityCipher::new(&config.crypto)?;

    AuthService::new(
        store,
        ledger,
        email,
        jwt,
        cipher,
        config.otp.code_ttl_minutes,
    )
}
