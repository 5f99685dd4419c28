use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Newtype for a raw password to prevent accidental logging.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Newtype for a stored password verifier (argon2 PHC string).
#[derive(Debug, Clone)]
pub struct Verifier(String);

impl Verifier {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a password using Argon2id with a random salt.
pub fn hash_password(password: &Password) -> Result<Verifier, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(Verifier::new(hash))
}

/// Verify a password against a stored verifier.
///
/// The verifier is never compared by raw equality; argon2 performs the
/// constant-time check internally.
pub fn verify_password(password: &Password, verifier: &Verifier) -> Result<(), anyhow::Error> {
    let parsed = PasswordHash::new(verifier.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed)
        .map_err(|_| anyhow::anyhow!("Password verification failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_produces_phc_string() {
        let password = Password::new("Passw0rd!".to_string());
        let verifier = hash_password(&password).expect("hash");

        assert!(verifier.as_str().starts_with("$argon2"));
    }

    #[test]
    fn test_verify_correct_and_incorrect() {
        let password = Password::new("Passw0rd!".to_string());
        let verifier = hash_password(&password).expect("hash");

        assert!(verify_password(&password, &verifier).is_ok());

        let wrong = Password::new("passw0rd!".to_string());
        assert!(verify_password(&wrong, &verifier).is_err());
    }

    #[test]
    fn test_salting_yields_distinct_hashes() {
        let password = Password::new("Passw0rd!".to_string());
        let first = hash_password(&password).expect("hash");
        let second = hash_password(&password).expect("hash");

        assert_ne!(first.as_str(), second.as_str());
        assert!(verify_password(&password, &first).is_ok());
        assert!(verify_password(&password, &second).is_ok());
    }

    #[test]
    fn test_debug_redacts_password() {
        let password = Password::new("Passw0rd!".to_string());
        assert_eq!(format!("{:?}", password), "Password(<redacted>)");
    }
}
