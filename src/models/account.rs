//! Account model - registered credentials and identity attributes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Role codes (closed set, default `user`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Moderator => "moderator",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            other => Err(format!("Invalid role: {}", other)),
        }
    }
}

/// Account entity as persisted.
///
/// The identity (email) is stored encrypted at rest (`email_enc`) alongside a
/// deterministic keyed digest (`email_lookup`) that carries the unique index,
/// so lookup stays O(1) without decrypting rows. The password hash is an
/// argon2 PHC string and is only ever checked through
/// [`crate::utils::verify_password`].
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub account_id: Uuid,
    pub email_enc: String,
    pub email_lookup: String,
    pub password_hash: String,
    pub display_name: String,
    pub role_code: String,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Account {
    /// Create a new account with the default role.
    pub fn new(
        email_enc: String,
        email_lookup: String,
        password_hash: String,
        display_name: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            account_id: Uuid::new_v4(),
            email_enc,
            email_lookup,
            password_hash,
            display_name,
            role_code: Role::User.as_str().to_string(),
            last_login_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Convert to a sanitized response, given the decrypted email.
    /// Never exposes the password hash or the at-rest ciphertext.
    pub fn sanitized(&self, email: String) -> AccountResponse {
        AccountResponse {
            account_id: self.account_id,
            email,
            display_name: self.display_name.clone(),
            role_code: self.role_code.clone(),
            last_login_utc: self.last_login_utc,
            created_utc: self.created_utc,
        }
    }
}

/// Account view returned to callers (no sensitive fields).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountResponse {
    pub account_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role_code: String,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}
