//! Credential store: persistence for account records.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::Account;
use crate::services::error::AuthError;

/// Durable storage for accounts. Duplicate detection happens inside the
/// store under its own atomicity guarantee, never as a caller-side
/// read-then-write.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new account. Fails with [`AuthError::Conflict`] when an
    /// account with the same lookup digest already exists.
    async fn insert(&self, account: &Account) -> Result<(), AuthError>;

    async fn find_by_lookup(&self, email_lookup: &str) -> Result<Option<Account>, AuthError>;

    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, AuthError>;

    /// Idempotent: stamp the last successful full authentication.
    async fn touch_last_login(&self, account_id: Uuid) -> Result<(), AuthError>;
}

/// PostgreSQL-backed credential store.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn insert(&self, account: &Account) -> Result<(), AuthError> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts
                (account_id, email_enc, email_lookup, password_hash, display_name,
                 role_code, last_login_utc, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(account.account_id)
        .bind(&account.email_enc)
        .bind(&account.email_lookup)
        .bind(&account.password_hash)
        .bind(&account.display_name)
        .bind(&account.role_code)
        .bind(account.last_login_utc)
        .bind(account.created_utc)
        .bind(account.updated_utc)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AuthError::Conflict),
            Err(e) => Err(AuthError::Storage(anyhow::anyhow!(e))),
        }
    }

    async fn find_by_lookup(&self, email_lookup: &str) -> Result<Option<Account>, AuthError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email_lookup = $1")
            .bind(email_lookup)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Storage(anyhow::anyhow!(e)))
    }

    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, AuthError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Storage(anyhow::anyhow!(e)))
    }

    async fn touch_last_login(&self, account_id: Uuid) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE accounts SET last_login_utc = NOW(), updated_utc = NOW() WHERE account_id = $1",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Storage(anyhow::anyhow!(e)))?;
        Ok(())
    }
}

/// In-memory credential store for tests. The single mutex gives the same
/// insert atomicity the unique index gives Postgres.
#[derive(Default)]
pub struct MemoryCredentialStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Account>>, AuthError> {
        self.accounts
            .lock()
            .map_err(|e| AuthError::Storage(anyhow::anyhow!("store mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, account: &Account) -> Result<(), AuthError> {
        let mut accounts = self.lock()?;
        if accounts
            .values()
            .any(|a| a.email_lookup == account.email_lookup)
        {
            return Err(AuthError::Conflict);
        }
        accounts.insert(account.account_id, account.clone());
        Ok(())
    }

    async fn find_by_lookup(&self, email_lookup: &str) -> Result<Option<Account>, AuthError> {
        let accounts = self.lock()?;
        Ok(accounts
            .values()
            .find(|a| a.email_lookup == email_lookup)
            .cloned())
    }

    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, AuthError> {
        let accounts = self.lock()?;
        Ok(accounts.get(&account_id).cloned())
    }

    async fn touch_last_login(&self, account_id: Uuid) -> Result<(), AuthError> {
        let mut accounts = self.lock()?;
        if let Some(account) = accounts.get_mut(&account_id) {
            let now = Utc::now();
            account.last_login_utc = Some(now);
            account.updated_utc = now;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(lookup: &str) -> Account {
        Account::new(
            "aa:bb".to_string(),
            lookup.to_string(),
            "$argon2id$...".to_string(),
            "Alice".to_string(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryCredentialStore::new();
        let account = account("digest-a");
        store.insert(&account).await.expect("insert");

        let by_lookup = store
            .find_by_lookup("digest-a")
            .await
            .expect("query")
            .expect("found");
        assert_eq!(by_lookup.account_id, account.account_id);

        let by_id = store
            .find_by_id(account.account_id)
            .await
            .expect("query")
            .expect("found");
        assert_eq!(by_id.email_lookup, "digest-a");
    }

    #[tokio::test]
    async fn test_duplicate_lookup_is_conflict() {
        let store = MemoryCredentialStore::new();
        let first = account("digest-a");
        store.insert(&first).await.expect("insert");

        let duplicate = account("digest-a");
        assert!(matches!(
            store.insert(&duplicate).await,
            Err(AuthError::Conflict)
        ));

        // Original row untouched.
        let kept = store
            .find_by_lookup("digest-a")
            .await
            .expect("query")
            .expect("found");
        assert_eq!(kept.account_id, first.account_id);
    }

    #[tokio::test]
    async fn test_touch_last_login_is_idempotent() {
        let store = MemoryCredentialStore::new();
        let account = account("digest-a");
        store.insert(&account).await.expect("insert");

        store.touch_last_login(account.account_id).await.expect("touch");
        store.touch_last_login(account.account_id).await.expect("touch");

        let loaded = store
            .find_by_id(account.account_id)
            .await
            .expect("query")
            .expect("found");
        assert!(loaded.last_login_utc.is_some());

        // Unknown id is a no-op, not an error.
        store.touch_last_login(Uuid::new_v4()).await.expect("touch");
    }
}
