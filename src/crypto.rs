// Connector Gateway -- secrets at rest
// Stored credentials may be AES-256-GCM encrypted as "enc:<nonce-hex>:<ciphertext-hex>".
// Values without the prefix are plaintext and pass through unchanged.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use sha2::{Digest, Sha256};

const PREFIX: &str = "enc:";

/// Encrypts/decrypts stored secrets with a key derived from a passphrase.
#[derive(Clone, Default)]
pub struct SecretCipher {
    key: Option<[u8; 32]>,
}

impl SecretCipher {
    /// Derive the 32-byte AES key via SHA-256. An empty passphrase disables encryption.
    pub fn new(passphrase: Option<&str>) -> Self {
        let key = passphrase.filter(|s| !s.is_empty()).map(|s| {
            let hash = Sha256::digest(s.as_bytes());
            let mut key = [0u8; 32];
            key.copy_from_slice(&hash);
            key
        });
        Self { key }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Returns the plaintext unchanged when no key is configured.
    pub fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        let Some(key) = self.key else {
            return Ok(plaintext.to_string());
        };
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let nonce_bytes: [u8; 12] = rand::random();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to encrypt secret: {}", e))?;
        Ok(format!(
            "{}{}:{}",
            PREFIX,
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, stored: &str) -> anyhow::Result<String> {
        let Some(rest) = stored.strip_prefix(PREFIX) else {
            return Ok(stored.to_string());
        };
        let Some(key) = self.key else {
            anyhow::bail!("Encrypted credential in DB but no encryption key configured");
        };
        let (nonce_hex, ciphertext_hex) = rest
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("Malformed encrypted credential format"))?;
        let nonce_bytes = hex::decode(nonce_hex)?;
        if nonce_bytes.len() != 12 {
            anyhow::bail!("Invalid nonce length: {} (expected 12)", nonce_bytes.len());
        }
        let ciphertext = hex::decode(ciphertext_hex)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| anyhow::anyhow!("Decryption failed (wrong key?): {}", e))?;
        Ok(String::from_utf8(plaintext)?)
    }
}
