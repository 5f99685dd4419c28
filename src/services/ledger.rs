//! Session ledger: one row per login attempt, from password check to
//! session end.
//!
//! The authentication state machine is the sole writer; the session guard
//! only reads, apart from the expiry-cleanup bulk close. State transitions
//! are committed through conditional updates so that racing writers resolve
//! to exactly one winner.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::LoginAttempt;
use crate::services::error::AuthError;

#[async_trait]
pub trait SessionLedger: Send + Sync {
    async fn insert(&self, attempt: &LoginAttempt) -> Result<(), AuthError>;

    async fn find_by_id(&self, attempt_id: Uuid) -> Result<Option<LoginAttempt>, AuthError>;

    /// Most recent active attempt (success = true, ended = null) for the
    /// account, if any.
    async fn find_active(&self, account_id: Uuid) -> Result<Option<LoginAttempt>, AuthError>;

    /// Flip `success = true` if and only if the attempt is still pending.
    /// Returns whether this call committed the transition; under concurrent
    /// duplicate submissions at most one caller observes `true`.
    async fn mark_succeeded(&self, attempt_id: Uuid) -> Result<bool, AuthError>;

    /// Close the attempt (set ended timestamp and derived duration) if not
    /// already closed. Returns whether this call committed the transition.
    async fn close(&self, attempt_id: Uuid) -> Result<bool, AuthError>;

    /// Close every active attempt for the account; returns the number of
    /// rows closed. Zero is not an error.
    async fn close_all_active(&self, account_id: Uuid) -> Result<u64, AuthError>;
}

/// PostgreSQL-backed session ledger. Conditional updates are plain
/// `UPDATE ... WHERE <still in expected state>` checks on `rows_affected`.
#[derive(Clone)]
pub struct PgSessionLedger {
    pool: PgPool,
}

impl PgSessionLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionLedger for PgSessionLedger {
    async fn insert(&self, attempt: &LoginAttempt) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts
                (attempt_id, account_id, client_ip, user_agent, code,
                 code_expires_utc, success, started_utc, ended_utc, duration_secs)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(attempt.attempt_id)
        .bind(attempt.account_id)
        .bind(&attempt.client_ip)
        .bind(&attempt.user_agent)
        .bind(&attempt.code)
        .bind(attempt.code_expires_utc)
        .bind(attempt.success)
        .bind(attempt.started_utc)
        .bind(attempt.ended_utc)
        .bind(attempt.duration_secs)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Storage(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn find_by_id(&self, attempt_id: Uuid) -> Result<Option<LoginAttempt>, AuthError> {
        sqlx::query_as::<_, LoginAttempt>("SELECT * FROM login_attempts WHERE attempt_id = $1")
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Storage(anyhow::anyhow!(e)))
    }

    async fn find_active(&self, account_id: Uuid) -> Result<Option<LoginAttempt>, AuthError> {
        sqlx::query_as::<_, LoginAttempt>(
            r#"
            SELECT * FROM login_attempts
            WHERE account_id = $1 AND success = TRUE AND ended_utc IS NULL
            ORDER BY started_utc DESC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Storage(anyhow::anyhow!(e)))
    }

    async fn mark_succeeded(&self, attempt_id: Uuid) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE login_attempts
            SET success = TRUE
            WHERE attempt_id = $1 AND success = FALSE AND ended_utc IS NULL
            "#,
        )
        .bind(attempt_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Storage(anyhow::anyhow!(e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn close(&self, attempt_id: Uuid) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE login_attempts
            SET ended_utc = NOW(),
                duration_secs = EXTRACT(EPOCH FROM (NOW() - started_utc))::BIGINT
            WHERE attempt_id = $1 AND ended_utc IS NULL
            "#,
        )
        .bind(attempt_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Storage(anyhow::anyhow!(e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn close_all_active(&self, account_id: Uuid) -> Result<u64, AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE login_attempts
            SET ended_utc = NOW(),
                duration_secs = EXTRACT(EPOCH FROM (NOW() - started_utc))::BIGINT
            WHERE account_id = $1 AND success = TRUE AND ended_utc IS NULL
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Storage(anyhow::anyhow!(e)))?;

        Ok(result.rows_affected())
    }
}

/// In-memory ledger for tests. One mutex over the map makes every
/// conditional update a compare-and-set, mirroring the SQL `WHERE` guards.
#[derive(Default)]
pub struct MemorySessionLedger {
    attempts: Mutex<HashMap<Uuid, LoginAttempt>>,
}

impl MemorySessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, LoginAttempt>>, AuthError> {
        self.attempts
            .lock()
            .map_err(|e| AuthError::Storage(anyhow::anyhow!("ledger mutex poisoned: {}", e)))
    }
}

fn close_in_place(attempt: &mut LoginAttempt) {
    let now = Utc::now();
    attempt.duration_secs = Some((now - attempt.started_utc).num_seconds());
    attempt.ended_utc = Some(now);
}

#[async_trait]
impl SessionLedger for MemorySessionLedger {
    async fn insert(&self, attempt: &LoginAttempt) -> Result<(), AuthError> {
        self.lock()?.insert(attempt.attempt_id, attempt.clone());
        Ok(())
    }

    async fn find_by_id(&self, attempt_id: Uuid) -> Result<Option<LoginAttempt>, AuthError> {
        Ok(self.lock()?.get(&attempt_id).cloned())
    }

    async fn find_active(&self, account_id: Uuid) -> Result<Option<LoginAttempt>, AuthError> {
        let attempts = self.lock()?;
        Ok(attempts
            .values()
            .filter(|a| a.account_id == account_id && a.is_active())
            .max_by_key(|a| a.started_utc)
            .cloned())
    }

    async fn mark_succeeded(&self, attempt_id: Uuid) -> Result<bool, AuthError> {
        let mut attempts = self.lock()?;
        match attempts.get_mut(&attempt_id) {
            Some(attempt) if attempt.is_pending() => {
                attempt.success = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn close(&self, attempt_id: Uuid) -> Result<bool, AuthError> {
        let mut attempts = self.lock()?;
        match attempts.get_mut(&attempt_id) {
            Some(attempt) if attempt.ended_utc.is_none() => {
                close_in_place(attempt);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn close_all_active(&self, account_id: Uuid) -> Result<u64, AuthError> {
        let mut attempts = self.lock()?;
        let mut closed = 0;
        for attempt in attempts.values_mut() {
            if attempt.account_id == account_id && attempt.is_active() {
                close_in_place(attempt);
                closed += 1;
            }
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientInfo;
    use chrono::Duration;

    fn attempt(account_id: Uuid) -> LoginAttempt {
        LoginAttempt::new(
            account_id,
            ClientInfo::default(),
            "ABCD1234".to_string(),
            Utc::now() + Duration::minutes(10),
        )
    }

    #[tokio::test]
    async fn test_mark_succeeded_commits_once() {
        let ledger = MemorySessionLedger::new();
        let attempt = attempt(Uuid::new_v4());
        ledger.insert(&attempt).await.expect("insert");

        assert!(ledger.mark_succeeded(attempt.attempt_id).await.expect("cas"));
        assert!(!ledger.mark_succeeded(attempt.attempt_id).await.expect("cas"));

        let loaded = ledger
            .find_by_id(attempt.attempt_id)
            .await
            .expect("query")
            .expect("found");
        assert!(loaded.success);
    }

    #[tokio::test]
    async fn test_close_is_monotonic() {
        let ledger = MemorySessionLedger::new();
        let attempt = attempt(Uuid::new_v4());
        ledger.insert(&attempt).await.expect("insert");

        assert!(ledger.close(attempt.attempt_id).await.expect("close"));
        // A closed attempt never transitions again.
        assert!(!ledger.close(attempt.attempt_id).await.expect("close"));
        assert!(!ledger.mark_succeeded(attempt.attempt_id).await.expect("cas"));

        let loaded = ledger
            .find_by_id(attempt.attempt_id)
            .await
            .expect("query")
            .expect("found");
        assert!(loaded.ended_utc.is_some());
        assert!(loaded.duration_secs.is_some());
        assert!(!loaded.success);
    }

    #[tokio::test]
    async fn test_find_active_picks_most_recent() {
        let ledger = MemorySessionLedger::new();
        let account_id = Uuid::new_v4();

        let mut first = attempt(account_id);
        first.success = true;
        first.started_utc = Utc::now() - Duration::minutes(5);
        ledger.insert(&first).await.expect("insert");

        let mut second = attempt(account_id);
        second.success = true;
        ledger.insert(&second).await.expect("insert");

        // A pending attempt for the same account is not "active".
        ledger.insert(&attempt(account_id)).await.expect("insert");

        let active = ledger
            .find_active(account_id)
            .await
            .expect("query")
            .expect("found");
        assert_eq!(active.attempt_id, second.attempt_id);
    }

    #[tokio::test]
    async fn test_close_all_active_skips_pending_and_foreign_rows() {
        let ledger = MemorySessionLedger::new();
        let account_id = Uuid::new_v4();

        let mut active_a = attempt(account_id);
        active_a.success = true;
        let mut active_b = attempt(account_id);
        active_b.success = true;
        let pending = attempt(account_id);
        let mut foreign = attempt(Uuid::new_v4());
        foreign.success = true;

        for a in [&active_a, &active_b, &pending, &foreign] {
            ledger.insert(a).await.expect("insert");
        }

        assert_eq!(ledger.close_all_active(account_id).await.expect("close"), 2);
        assert_eq!(ledger.close_all_active(account_id).await.expect("close"), 0);

        let untouched = ledger
            .find_by_id(pending.attempt_id)
            .await
            .expect("query")
            .expect("found");
        assert!(untouched.is_pending());

        let still_active = ledger
            .find_active(foreign.account_id)
            .await
            .expect("query");
        assert!(still_active.is_some());
    }
}
