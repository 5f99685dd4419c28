//! Identity-at-rest confidentiality.
//!
//! Emails are stored as AES-256-GCM ciphertext in `nonce_hex:ciphertext_hex`
//! form, with a separate keyed HMAC-SHA256 digest persisted alongside as the
//! unique lookup index. The digest is deterministic and non-invertible, so
//! lookup by identity stays indexed without ever decrypting rows.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

use crate::config::CryptoConfig;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Invalid ciphertext format")]
    Format,

    #[error("Decryption failed")]
    Decrypt,

    #[error("Encryption failed")]
    Encrypt,
}

/// Symmetric cipher plus lookup-digest keyed hash for stored identities.
#[derive(Clone)]
pub struct IdentityCipher {
    cipher: Aes256Gcm,
    lookup_key: Vec<u8>,
}

impl IdentityCipher {
    /// Build from hex-encoded 32-byte keys.
    pub fn new(config: &CryptoConfig) -> Result<Self, anyhow::Error> {
        let enc_key = decode_key(&config.encryption_key, "ENCRYPTION_KEY")?;
        let lookup_key = decode_key(&config.lookup_key, "LOOKUP_KEY")?;

        let cipher = Aes256Gcm::new_from_slice(&enc_key)
            .map_err(|e| anyhow::anyhow!("Failed to initialize cipher: {}", e))?;

        Ok(Self { cipher, lookup_key })
    }

    /// Encrypt a plaintext identity. Output format: `nonce_hex:ciphertext_hex`.
    /// A fresh random nonce makes ciphertexts non-deterministic.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        Ok(format!(
            "{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt a stored identity. Tampered or malformed input fails; the GCM
    /// tag makes tampering detectable.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let (nonce_hex, ct_hex) = encoded.split_once(':').ok_or(CipherError::Format)?;

        let nonce_bytes = hex::decode(nonce_hex).map_err(|_| CipherError::Format)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CipherError::Format);
        }
        let ciphertext = hex::decode(ct_hex).map_err(|_| CipherError::Format)?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Decrypt)
    }

    /// Deterministic keyed digest of a normalized identity, hex-encoded.
    pub fn lookup_digest(&self, identity: &str) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.lookup_key)
            .expect("HMAC accepts keys of any length");
        mac.update(identity.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn decode_key(hex_key: &str, name: &str) -> Result<Vec<u8>, anyhow::Error> {
    let bytes =
        hex::decode(hex_key).map_err(|e| anyhow::anyhow!("{} is not valid hex: {}", name, e))?;
    if bytes.len() != KEY_LEN {
        return Err(anyhow::anyhow!(
            "{} must be {} bytes ({} hex chars), got {} bytes",
            name,
            KEY_LEN,
            KEY_LEN * 2,
            bytes.len()
        ));
    }
    Ok(bytes)
}
