//! Encryption of generated secrets kept in the state file

use crate::error::{CloudError, Result};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Environment variable holding the state passphrase
pub const PASSPHRASE_ENV: &str = "INFRAFLOW_PASSPHRASE";

const NONCE_SIZE: usize = 12;

/// AES-256-GCM keyed by the SHA-256 of a passphrase
///
/// Ciphertexts are stored as base64 of `nonce || ciphertext`.
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    pub fn from_passphrase(passphrase: &str) -> Self {
        let key = Sha256::digest(passphrase.as_bytes());
        Self {
            cipher: Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Build from `INFRAFLOW_PASSPHRASE`
    pub fn from_env() -> Result<Self> {
        match std::env::var(PASSPHRASE_ENV) {
            Ok(passphrase) if !passphrase.is_empty() => Ok(Self::from_passphrase(&passphrase)),
            _ => Err(CloudError::MissingPassphrase),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CloudError::Encryption(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| CloudError::Decryption(format!("invalid base64: {}", e)))?;
        if combined.len() <= NONCE_SIZE {
            return Err(CloudError::Decryption("ciphertext too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                CloudError::Decryption("wrong passphrase or corrupted state".to_string())
            })?;
        String::from_utf8(plaintext).map_err(|e| CloudError::Decryption(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = SecretCipher::from_passphrase("correct horse");
        let encrypted = cipher.encrypt("db-password").unwrap();
        assert!(!encrypted.contains("db-password"));
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "db-password");
    }

    #[test]
    fn test_nonce_differs_per_call() {
        let cipher = SecretCipher::from_passphrase("p");
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let encrypted = SecretCipher::from_passphrase("one").encrypt("value").unwrap();
        let result = SecretCipher::from_passphrase("two").decrypt(&encrypted);
        assert!(matches!(result, Err(CloudError::Decryption(_))));
    }

    #[test]
    fn test_garbage_input() {
        let cipher = SecretCipher::from_passphrase("p");
        assert!(cipher.decrypt("not base64 !!").is_err());
        assert!(cipher.decrypt(&BASE64.encode([0u8; 4])).is_err());
    }
}
