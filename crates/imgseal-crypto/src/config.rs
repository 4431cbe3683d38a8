//! Crypto configuration handed to an image transform.
//!
//! Parameters are free-form string keys mapping to ordered lists of byte
//! blobs, which lets one configuration carry several recipients or several
//! private keys at once.

use std::collections::HashMap;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PrivateKey, PublicKey};

/// Recipient public key files.
pub const PUBKEYS: &str = "pubkeys";
/// Private key files.
pub const PRIVKEYS: &str = "privkeys";
/// Passwords for `privkeys`, index-aligned; an empty entry means none.
pub const PRIVKEYS_PASSWORDS: &str = "privkeys-passwords";

/// String-keyed lists of byte blobs.
pub type Parameters = HashMap<String, Vec<Vec<u8>>>;

/// Private key material used to decrypt layers.
#[derive(Clone, Default)]
pub struct DecryptConfig {
    pub parameters: Parameters,
}

impl DecryptConfig {
    /// Configuration holding the given private key files.
    pub fn new(private_keys: Vec<Vec<u8>>) -> Self {
        let passwords = vec![Vec::new(); private_keys.len()];
        Self::with_passwords(private_keys, passwords)
    }

    /// Configuration holding private key files with aligned passwords.
    pub fn with_passwords(private_keys: Vec<Vec<u8>>, passwords: Vec<Vec<u8>>) -> Self {
        let mut parameters = Parameters::new();
        parameters.insert(PRIVKEYS.to_string(), private_keys);
        parameters.insert(PRIVKEYS_PASSWORDS.to_string(), passwords);
        Self { parameters }
    }

    /// Returns `true` if no private keys are configured.
    pub fn is_empty(&self) -> bool {
        self.parameters.get(PRIVKEYS).map_or(true, Vec::is_empty)
    }

    /// Decode every configured private key, opening protected ones with their
    /// password.
    pub fn private_keys(&self) -> CryptoResult<Vec<PrivateKey>> {
        let Some(files) = self.parameters.get(PRIVKEYS) else {
            return Ok(Vec::new());
        };
        let passwords = self.parameters.get(PRIVKEYS_PASSWORDS);
        files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let password = passwords.and_then(|p| p.get(i)).map(Vec::as_slice);
                PrivateKey::parse(file, password)
            })
            .collect()
    }
}

/// Recipient public keys used to encrypt layers.
///
/// The embedded [`DecryptConfig`] is consulted only when recipients are added
/// to a layer that is already encrypted: the existing layer key has to be
/// unwrapped before it can be wrapped for the new recipients.
#[derive(Clone, Default)]
pub struct EncryptConfig {
    pub parameters: Parameters,
    pub decrypt: DecryptConfig,
}

impl EncryptConfig {
    /// Configuration addressing the given public key files.
    pub fn new(public_keys: Vec<Vec<u8>>) -> Self {
        let mut parameters = Parameters::new();
        parameters.insert(PUBKEYS.to_string(), public_keys);
        Self {
            parameters,
            decrypt: DecryptConfig::default(),
        }
    }

    /// Builder: attach keys able to unwrap already-encrypted layers.
    pub fn with_decrypt(mut self, decrypt: DecryptConfig) -> Self {
        self.decrypt = decrypt;
        self
    }

    /// Decode every recipient public key, dropping duplicates.
    pub fn public_keys(&self) -> CryptoResult<Vec<PublicKey>> {
        let mut keys: Vec<PublicKey> = Vec::new();
        for file in self.parameters.get(PUBKEYS).into_iter().flatten() {
            let key = PublicKey::parse(file)?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            return Err(CryptoError::NoRecipients);
        }
        Ok(keys)
    }
}

/// Encryption and/or decryption configuration for one transform.
#[derive(Clone, Default, Debug)]
pub struct CryptoConfig {
    pub encrypt: Option<EncryptConfig>,
    pub decrypt: Option<DecryptConfig>,
}

impl CryptoConfig {
    /// Configuration for an encryption transform.
    pub fn encryption(encrypt: EncryptConfig) -> Self {
        Self {
            encrypt: Some(encrypt),
            decrypt: None,
        }
    }

    /// Configuration for a decryption transform.
    pub fn decryption(decrypt: DecryptConfig) -> Self {
        Self {
            encrypt: None,
            decrypt: Some(decrypt),
        }
    }

    /// Returns `true` if neither half is present.
    pub fn is_empty(&self) -> bool {
        self.encrypt.is_none() && self.decrypt.is_none()
    }
}

fn summarize(parameters: &Parameters) -> Vec<(&str, usize)> {
    let mut summary: Vec<(&str, usize)> = parameters
        .iter()
        .map(|(k, v)| (k.as_str(), v.len()))
        .collect();
    summary.sort();
    summary
}

// Key material never reaches logs: only parameter names and counts.
impl std::fmt::Debug for DecryptConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptConfig")
            .field("parameters", &summarize(&self.parameters))
            .finish()
    }
}

impl std::fmt::Debug for EncryptConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptConfig")
            .field("parameters", &summarize(&self.parameters))
            .field("decrypt", &self.decrypt)
            .finish()
    }
}
