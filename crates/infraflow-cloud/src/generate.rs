//! Generated key material (passwords, keys, self-signed certificates)
//!
//! Each value is generated once per stack and kept encrypted in the state
//! file, so re-composing the stack yields identical values.

use crate::cipher::SecretCipher;
use crate::error::{CloudError, Result};
use crate::secret::Secret;
use chrono::{Datelike, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%&*()-_=+[]{}<>:?";

/// Character classes for a random password
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub length: usize,
    pub upper: bool,
    pub lower: bool,
    pub digits: bool,
    pub special: bool,
}

impl PasswordPolicy {
    /// Upper, lower and digits
    pub fn alphanumeric(length: usize) -> Self {
        Self {
            length,
            upper: true,
            lower: true,
            digits: true,
            special: false,
        }
    }

    /// Lower, digits and specials (no uppercase)
    pub fn lower_digits_special(length: usize) -> Self {
        Self {
            length,
            upper: false,
            lower: true,
            digits: true,
            special: true,
        }
    }

    fn classes(&self) -> Vec<&'static [u8]> {
        [
            (self.lower, LOWER),
            (self.upper, UPPER),
            (self.digits, DIGITS),
            (self.special, SPECIAL),
        ]
        .into_iter()
        .filter_map(|(enabled, set)| enabled.then_some(set))
        .collect()
    }

    /// Generate a password with at least one character of each enabled class
    pub fn generate(&self) -> Result<String> {
        let classes = self.classes();
        if classes.is_empty() || self.length < classes.len() {
            return Err(CloudError::InvalidConfig(format!(
                "password policy cannot produce {} characters from {} classes",
                self.length,
                classes.len()
            )));
        }

        let mut rng = rand::thread_rng();
        let alphabet: Vec<u8> = classes.iter().flat_map(|c| c.iter().copied()).collect();
        let mut chars: Vec<u8> = classes
            .iter()
            .map(|class| class[rng.gen_range(0..class.len())])
            .collect();
        while chars.len() < self.length {
            chars.push(alphabet[rng.gen_range(0..alphabet.len())]);
        }
        chars.shuffle(&mut rng);
        Ok(chars.into_iter().map(char::from).collect())
    }
}

/// PEM-encoded private key and self-signed certificate
#[derive(Debug, Clone)]
pub struct CertificateMaterial {
    pub certificate_pem: String,
    pub private_key_pem: Secret<String>,
}

#[derive(Serialize, Deserialize)]
struct StoredCertificate {
    certificate_pem: String,
    private_key_pem: String,
}

impl CertificateMaterial {
    /// New key pair and a self-signed certificate valid for one year
    pub fn self_signed(common_name: &str, subject_alt_names: &[String]) -> Result<Self> {
        let mut params = CertificateParams::new(subject_alt_names.to_vec())?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
        params.distinguished_name = dn;

        let today = Utc::now().date_naive();
        let day = today.day().min(28) as u8;
        let month = today.month() as u8;
        params.not_before = rcgen::date_time_ymd(today.year(), month, day);
        params.not_after = rcgen::date_time_ymd(today.year() + 1, month, day);

        let key_pair = KeyPair::generate()?;
        let cert = params.self_signed(&key_pair)?;

        Ok(Self {
            certificate_pem: cert.pem(),
            private_key_pem: Secret::new(key_pair.serialize_pem()),
        })
    }
}

/// Generated secrets for one stack, backed by the state file's `secrets` map
pub struct SecretVault {
    cipher: Option<SecretCipher>,
    entries: BTreeMap<String, String>,
    generated: Vec<String>,
}

impl SecretVault {
    /// Vault persisting into `entries` (encrypted with `cipher`)
    pub fn new(cipher: SecretCipher, entries: BTreeMap<String, String>) -> Self {
        Self {
            cipher: Some(cipher),
            entries,
            generated: Vec::new(),
        }
    }

    /// Vault that generates fresh values and never persists them
    ///
    /// Used for structural checks where no passphrase is available.
    pub fn ephemeral() -> Self {
        Self {
            cipher: None,
            entries: BTreeMap::new(),
            generated: Vec::new(),
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.cipher.is_none()
    }

    /// Keys generated during this run
    pub fn generated(&self) -> &[String] {
        &self.generated
    }

    /// Encrypted entries to store back into state
    pub fn into_entries(self) -> BTreeMap<String, String> {
        self.entries
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        match (&self.cipher, self.entries.get(key)) {
            (Some(cipher), Some(encrypted)) => cipher.decrypt(encrypted).map(Some),
            _ => Ok(None),
        }
    }

    fn store(&mut self, key: &str, plaintext: &str) -> Result<()> {
        if let Some(cipher) = &self.cipher {
            let encrypted = cipher.encrypt(plaintext)?;
            self.entries.insert(key.to_string(), encrypted);
        }
        self.generated.push(key.to_string());
        Ok(())
    }

    /// Password stored under `key`, generated on first use
    pub fn password(&mut self, key: &str, policy: &PasswordPolicy) -> Result<Secret<String>> {
        if let Some(existing) = self.load(key)? {
            debug!(key = %key, "Reusing generated password");
            return Ok(Secret::new(existing));
        }
        let password = policy.generate()?;
        self.store(key, &password)?;
        info!(key = %key, length = policy.length, "Generated password");
        Ok(Secret::new(password))
    }

    /// Key pair and self-signed certificate stored under `key`
    pub fn certificate(
        &mut self,
        key: &str,
        common_name: &str,
        subject_alt_names: &[String],
    ) -> Result<CertificateMaterial> {
        if let Some(existing) = self.load(key)? {
            let stored: StoredCertificate = serde_json::from_str(&existing)?;
            debug!(key = %key, "Reusing generated certificate");
            return Ok(CertificateMaterial {
                certificate_pem: stored.certificate_pem,
                private_key_pem: Secret::new(stored.private_key_pem),
            });
        }

        let material = CertificateMaterial::self_signed(common_name, subject_alt_names)?;
        let stored = StoredCertificate {
            certificate_pem: material.certificate_pem.clone(),
            private_key_pem: material.private_key_pem.expose().clone(),
        };
        self.store(key, &serde_json::to_string(&stored)?)?;
        info!(key = %key, common_name = %common_name, "Generated self-signed certificate");
        Ok(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_policy_classes() {
        let password = PasswordPolicy::lower_digits_special(16).generate().unwrap();
        assert_eq!(password.len(), 16);
        assert!(!password.chars().any(|c| c.is_ascii_uppercase()));
        assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        assert!(password.chars().any(|c| c.is_ascii_digit()));
        assert!(password.bytes().any(|b| SPECIAL.contains(&b)));

        let token = PasswordPolicy::alphanumeric(16).generate().unwrap();
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_policy_too_short() {
        assert!(PasswordPolicy::lower_digits_special(2).generate().is_err());
    }

    #[test]
    fn test_vault_reuses_values() {
        let mut vault = SecretVault::new(SecretCipher::from_passphrase("pw"), BTreeMap::new());
        let first = vault
            .password("db-password", &PasswordPolicy::alphanumeric(12))
            .unwrap();
        let entries = vault.into_entries();
        assert!(!entries["db-password"].contains(first.expose().as_str()));

        let mut reopened = SecretVault::new(SecretCipher::from_passphrase("pw"), entries);
        let second = reopened
            .password("db-password", &PasswordPolicy::alphanumeric(12))
            .unwrap();
        assert_eq!(first, second);
        assert!(reopened.generated().is_empty());
    }

    #[test]
    fn test_vault_wrong_passphrase() {
        let mut vault = SecretVault::new(SecretCipher::from_passphrase("a"), BTreeMap::new());
        vault.password("k", &PasswordPolicy::alphanumeric(8)).unwrap();
        let mut other = SecretVault::new(SecretCipher::from_passphrase("b"), vault.into_entries());
        assert!(other.password("k", &PasswordPolicy::alphanumeric(8)).is_err());
    }

    #[test]
    fn test_ephemeral_vault_does_not_persist() {
        let mut vault = SecretVault::ephemeral();
        vault.password("k", &PasswordPolicy::alphanumeric(8)).unwrap();
        assert!(vault.is_ephemeral());
        assert_eq!(vault.generated(), ["k".to_string()]);
        assert!(vault.into_entries().is_empty());
    }

    #[test]
    fn test_certificate_generated_once() {
        let mut vault = SecretVault::new(SecretCipher::from_passphrase("pw"), BTreeMap::new());
        let sans = vec!["edgedb".to_string()];
        let cert = vault.certificate("edgedb-tls", "edgedb", &sans).unwrap();
        assert!(cert.certificate_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(cert.private_key_pem.expose().contains("PRIVATE KEY"));

        let mut reopened = SecretVault::new(SecretCipher::from_passphrase("pw"), vault.into_entries());
        let again = reopened.certificate("edgedb-tls", "edgedb", &sans).unwrap();
        assert_eq!(cert.certificate_pem, again.certificate_pem);
    }
}
