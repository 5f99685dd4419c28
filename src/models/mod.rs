//! Data models for accounts and the session ledger.

mod account;
mod login_attempt;

pub use account::{Account, AccountResponse, Role};
pub use login_attempt::{AttemptState, ClientInfo, LoginAttempt, UNKNOWN_CLIENT};
