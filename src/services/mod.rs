//! Services layer: the authentication state machine and its collaborators.

pub mod auth;
pub mod crypto;
pub mod email;
pub mod error;
pub mod guard;
pub mod jwt;
pub mod ledger;
pub mod otp;
pub mod store;

pub use auth::{normalize_identity, AuthResponse, AuthService};
pub use crypto::{CipherError, IdentityCipher};
pub use email::{EmailProvider, MockEmailService, SmtpEmailService};
pub use error::AuthError;
pub use guard::SessionGuard;
pub use jwt::{JwtService, SessionClaims, TokenError, TokenResponse};
pub use ledger::{MemorySessionLedger, PgSessionLedger, SessionLedger};
pub use store::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
