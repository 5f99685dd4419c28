//! Login attempt model - one ledger row per MFA-gated login flow.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Sentinel recorded when client metadata is unavailable.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Lifecycle state derived from the `(success, ended_utc)` pair.
///
/// Transitions are monotonic: Pending -> Active -> Closed, or
/// Pending -> Closed for abandoned attempts. A closed attempt never
/// transitions again; the conditional updates in the ledger enforce this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Active,
    Closed,
}

/// Best-effort request metadata captured at attempt creation.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One row in the session ledger.
#[derive(Debug, Clone, FromRow)]
pub struct LoginAttempt {
    pub attempt_id: Uuid,
    pub account_id: Uuid,
    pub client_ip: String,
    pub user_agent: String,
    pub code: String,
    pub code_expires_utc: DateTime<Utc>,
    pub success: bool,
    pub started_utc: DateTime<Utc>,
    pub ended_utc: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
}

impl LoginAttempt {
    /// Create a pending attempt. The one-time code is bound here and never
    /// regenerated for this attempt.
    pub fn new(
        account_id: Uuid,
        client: ClientInfo,
        code: String,
        code_expires_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            account_id,
            client_ip: client.ip.unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
            user_agent: client
                .user_agent
                .unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
            code,
            code_expires_utc,
            success: false,
            started_utc: Utc::now(),
            ended_utc: None,
            duration_secs: None,
        }
    }

    pub fn state(&self) -> AttemptState {
        match (self.success, self.ended_utc.is_some()) {
            (_, true) => AttemptState::Closed,
            (true, false) => AttemptState::Active,
            (false, false) => AttemptState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == AttemptState::Pending
    }

    pub fn is_active(&self) -> bool {
        self.state() == AttemptState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn attempt() -> LoginAttempt {
        LoginAttempt::new(
            Uuid::new_v4(),
            ClientInfo::default(),
            "ABCD1234".to_string(),
            Utc::now() + Duration::minutes(10),
        )
    }

    #[test]
    fn test_new_attempt_is_pending() {
        let attempt = attempt();
        assert_eq!(attempt.state(), AttemptState::Pending);
        assert!(attempt.is_pending());
        assert!(!attempt.is_active());
    }

    #[test]
    fn test_client_sentinels() {
        let attempt = attempt();
        assert_eq!(attempt.client_ip, UNKNOWN_CLIENT);
        assert_eq!(attempt.user_agent, UNKNOWN_CLIENT);

        let with_client = LoginAttempt::new(
            Uuid::new_v4(),
            ClientInfo {
                ip: Some("10.0.0.1".to_string()),
                user_agent: Some("curl/8.0".to_string()),
            },
            "ABCD1234".to_string(),
            Utc::now(),
        );
        assert_eq!(with_client.client_ip, "10.0.0.1");
        assert_eq!(with_client.user_agent, "curl/8.0");
    }

    #[test]
    fn test_state_derivation() {
        let mut verified = attempt();

        verified.success = true;
        assert_eq!(verified.state(), AttemptState::Active);

        verified.ended_utc = Some(Utc::now());
        assert_eq!(verified.state(), AttemptState::Closed);

        // Abandoned without ever succeeding.
        let mut abandoned = attempt();
        abandoned.ended_utc = Some(Utc::now());
        assert_eq!(abandoned.state(), AttemptState::Closed);
    }
}
