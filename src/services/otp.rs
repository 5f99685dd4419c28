//! One-time code engine.
//!
//! Codes are fixed-length, drawn from a 36-symbol uppercase alphanumeric
//! alphabet (about 41 bits for 8 characters) and bound to a single login
//! attempt at creation. Brute-force protection inside the validity window
//! relies on the short TTL here plus per-attempt throttling in the outer
//! layer; see DESIGN.md.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::models::LoginAttempt;

pub const CODE_LENGTH: usize = 8;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Outcome of checking a presented code against an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Valid,
    Invalid,
    Expired,
}

/// Generate a fresh one-time code.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Check a presented code against a loaded attempt.
///
/// Comparison is case-insensitive: the presented code is uppercased before
/// matching, since stored codes are uppercase by construction. `Valid` is
/// only possible while the attempt is still pending; an already-succeeded or
/// closed attempt yields `Invalid` regardless of the code, which is what
/// rejects replays. The actual single-use flip happens in the ledger's
/// conditional update, not here.
pub fn validate(attempt: &LoginAttempt, presented: &str, now: DateTime<Utc>) -> CodeCheck {
    if !attempt.is_pending() {
        return CodeCheck::Invalid;
    }
    if presented.trim().to_uppercase() != attempt.code {
        return CodeCheck::Invalid;
    }
    if now >= attempt.code_expires_utc {
        return CodeCheck::Expired;
    }
    CodeCheck::Valid
}
