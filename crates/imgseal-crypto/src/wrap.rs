//! Per-recipient wrapping of a layer's private options.
//!
//! X25519 recipients: a fresh ephemeral X25519 key is agreed against the
//! recipient's public key, the key-encryption key is derived from the shared
//! secret with BLAKE3 in key-derivation mode, and it seals the payload with
//! AES-256-GCM.
//!
//! RSA recipients: a random key-encryption key seals the payload with
//! AES-256-GCM and is itself encrypted with RSA-OAEP-SHA256.
//!
//! Either way only the holder of the recipient's private key can recover the
//! key-encryption key and open the record.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::cipher::{open_once, seal_once};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{KeyScheme, PrivateKey, PublicKey};

const KEK_CONTEXT: &str = "imgseal 2025-01 x25519 layer key wrap v1";

/// One wrapped copy of a layer's private options, addressed to one recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// Scheme the record was sealed with; implied by the annotation that
    /// carries it.
    #[serde(skip)]
    pub scheme: KeyScheme,
    /// Fingerprint of the recipient public key.
    pub recipient: String,
    /// X25519: ephemeral public key. RSA: OAEP-encrypted key-encryption key.
    /// Base64.
    pub ephemeral: String,
    /// AES-256-GCM nonce (base64).
    pub nonce: String,
    /// Sealed payload with tag (base64).
    pub ciphertext: String,
}

impl WrappedKey {
    /// Wrap `payload` for `recipient`.
    pub fn seal(recipient: &PublicKey, payload: &[u8]) -> CryptoResult<Self> {
        match recipient {
            PublicKey::X25519(key) => seal_x25519(key, payload),
            PublicKey::Rsa(key) => seal_rsa(key, &recipient.fingerprint(), payload),
        }
    }

    /// Returns `true` if this record is addressed to `key`'s public key.
    pub fn is_for(&self, key: &PrivateKey) -> bool {
        self.scheme == key.scheme() && self.recipient == key.public_key().fingerprint()
    }

    /// Recover the payload with the recipient's private key.
    pub fn open(&self, key: &PrivateKey) -> CryptoResult<Vec<u8>> {
        if self.scheme != key.scheme() {
            return Err(CryptoError::InvalidKey(format!(
                "{} record cannot be opened with a {} key",
                self.scheme,
                key.scheme()
            )));
        }
        let ephemeral = decode(&self.ephemeral, "ephemeral")?;
        let nonce = decode(&self.nonce, "nonce")?;
        let ciphertext = decode(&self.ciphertext, "ciphertext")?;
        match key {
            PrivateKey::X25519(secret) => open_x25519(secret, &ephemeral, &nonce, &ciphertext),
            PrivateKey::Rsa(secret) => {
                let fingerprint = key.public_key().fingerprint();
                open_rsa(secret, &fingerprint, &ephemeral, &nonce, &ciphertext)
            }
        }
    }

    /// Encode as one entry of the comma-separated key annotation.
    pub fn to_annotation(&self) -> CryptoResult<String> {
        let json = serde_json::to_vec(self).map_err(|e| CryptoError::Serialization(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }

    /// Decode one entry of the key annotation for `scheme`.
    pub fn from_annotation(entry: &str, scheme: KeyScheme) -> CryptoResult<Self> {
        let json = decode(entry, "wrapped key")?;
        let mut record: Self = serde_json::from_slice(&json)
            .map_err(|e| CryptoError::MalformedAnnotations(format!("wrapped key: {e}")))?;
        record.scheme = scheme;
        Ok(record)
    }
}

/// Encode a set of wrapped keys as the comma-separated annotation value.
pub fn encode_wrapped_keys(keys: &[WrappedKey]) -> CryptoResult<String> {
    let entries = keys
        .iter()
        .map(WrappedKey::to_annotation)
        .collect::<CryptoResult<Vec<_>>>()?;
    Ok(entries.join(","))
}

/// Decode the comma-separated annotation value of `scheme`. Empty entries are
/// skipped.
pub fn decode_wrapped_keys(value: &str, scheme: KeyScheme) -> CryptoResult<Vec<WrappedKey>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| WrappedKey::from_annotation(entry, scheme))
        .collect()
}

fn seal_x25519(recipient: &x25519_dalek::PublicKey, payload: &[u8]) -> CryptoResult<WrappedKey> {
    let ephemeral = x25519_dalek::EphemeralSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey(
            "recipient public key is a low-order point".into(),
        ));
    }
    let kek = derive_kek(shared.as_bytes(), ephemeral_public.as_bytes(), recipient.as_bytes());
    let aad = wrap_aad(ephemeral_public.as_bytes(), recipient.as_bytes());
    let (nonce, ciphertext) = seal_once(&kek, &aad, payload)?;
    Ok(WrappedKey {
        scheme: KeyScheme::X25519,
        recipient: hex::encode(recipient.as_bytes()),
        ephemeral: STANDARD.encode(ephemeral_public.as_bytes()),
        nonce: STANDARD.encode(nonce),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

fn open_x25519(
    secret: &x25519_dalek::StaticSecret,
    ephemeral: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let ephemeral: [u8; 32] = ephemeral.try_into().map_err(|_| {
        CryptoError::MalformedAnnotations("ephemeral key must be 32 bytes".into())
    })?;
    let ephemeral_public = x25519_dalek::PublicKey::from(ephemeral);
    let shared = secret.diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(CryptoError::MalformedAnnotations(
            "ephemeral key is a low-order point".into(),
        ));
    }
    let recipient = x25519_dalek::PublicKey::from(secret);
    let kek = derive_kek(shared.as_bytes(), &ephemeral, recipient.as_bytes());
    let aad = wrap_aad(&ephemeral, recipient.as_bytes());
    open_once(&kek, nonce, &aad, ciphertext)
}

// The fingerprint is bound as AAD so a record cannot be relabelled.
fn seal_rsa(
    recipient: &RsaPublicKey,
    fingerprint: &str,
    payload: &[u8],
) -> CryptoResult<WrappedKey> {
    let mut kek = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut kek);
    let wrapped_kek = recipient
        .encrypt(&mut rand::rngs::OsRng, Oaep::new::<Sha256>(), &kek)
        .map_err(|e| CryptoError::InvalidKey(format!("rsa-oaep: {e}")))?;
    let (nonce, ciphertext) = seal_once(&kek, fingerprint.as_bytes(), payload)?;
    Ok(WrappedKey {
        scheme: KeyScheme::Rsa,
        recipient: fingerprint.to_string(),
        ephemeral: STANDARD.encode(wrapped_kek),
        nonce: STANDARD.encode(nonce),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

fn open_rsa(
    secret: &RsaPrivateKey,
    fingerprint: &str,
    wrapped_kek: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let kek: [u8; 32] = secret
        .decrypt(Oaep::new::<Sha256>(), wrapped_kek)
        .map_err(|e| CryptoError::Authentication(format!("rsa-oaep: {e}")))?
        .try_into()
        .map_err(|_| {
            CryptoError::MalformedAnnotations("key-encryption key must be 32 bytes".into())
        })?;
    open_once(&kek, nonce, fingerprint.as_bytes(), ciphertext)
}

fn derive_kek(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; 32] {
    let mut material = [0u8; 96];
    material[..32].copy_from_slice(shared);
    material[32..64].copy_from_slice(ephemeral);
    material[64..].copy_from_slice(recipient);
    blake3::derive_key(KEK_CONTEXT, &material)
}

fn wrap_aad(ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; 64] {
    let mut aad = [0u8; 64];
    aad[..32].copy_from_slice(ephemeral);
    aad[32..].copy_from_slice(recipient);
    aad
}

fn decode(value: &str, field: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::MalformedAnnotations(format!("{field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_and_open() {
        let sk = PrivateKey::generate();
        let wrapped = WrappedKey::seal(&sk.public_key(), b"layer options").unwrap();
        assert!(wrapped.is_for(&sk));
        assert_eq!(wrapped.open(&sk).unwrap(), b"layer options");
    }

    #[test]
    fn other_key_cannot_open() {
        let sk = PrivateKey::generate();
        let other = PrivateKey::generate();
        let wrapped = WrappedKey::seal(&sk.public_key(), b"secret").unwrap();
        assert!(!wrapped.is_for(&other));
        assert!(wrapped.open(&other).is_err());
    }

    #[test]
    fn each_wrap_uses_a_fresh_ephemeral_key() {
        let pk = PrivateKey::generate().public_key();
        let a = WrappedKey::seal(&pk, b"same").unwrap();
        let b = WrappedKey::seal(&pk, b"same").unwrap();
        assert_ne!(a.ephemeral, b.ephemeral);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let sk = PrivateKey::generate();
        let mut wrapped = WrappedKey::seal(&sk.public_key(), b"secret").unwrap();
        let mut raw = STANDARD.decode(&wrapped.ciphertext).unwrap();
        raw[0] ^= 0xff;
        wrapped.ciphertext = STANDARD.encode(raw);
        assert!(matches!(wrapped.open(&sk), Err(CryptoError::Authentication(_))));
    }

    #[test]
    fn annotation_encoding_roundtrip() {
        let a = WrappedKey::seal(&PrivateKey::generate().public_key(), b"1").unwrap();
        let b = WrappedKey::seal(&PrivateKey::generate().public_key(), b"2").unwrap();
        let value = encode_wrapped_keys(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(value.matches(',').count(), 1);
        assert_eq!(decode_wrapped_keys(&value, KeyScheme::X25519).unwrap(), vec![a, b]);
    }

    #[test]
    fn garbage_annotation_is_malformed() {
        assert!(matches!(
            decode_wrapped_keys("!!!not-base64", KeyScheme::X25519),
            Err(CryptoError::MalformedAnnotations(_))
        ));
        assert!(decode_wrapped_keys("", KeyScheme::Rsa).unwrap().is_empty());
    }

    #[test]
    fn rsa_seal_and_open() {
        let sk = crate::keys::rsa_test_key();
        let wrapped = WrappedKey::seal(&sk.public_key(), b"layer options").unwrap();
        assert_eq!(wrapped.scheme, KeyScheme::Rsa);
        assert!(wrapped.is_for(&sk));
        assert_eq!(wrapped.open(&sk).unwrap(), b"layer options");

        let value = encode_wrapped_keys(std::slice::from_ref(&wrapped)).unwrap();
        let decoded = decode_wrapped_keys(&value, KeyScheme::Rsa).unwrap();
        assert_eq!(decoded[0].open(&sk).unwrap(), b"layer options");
    }

    #[test]
    fn rsa_record_is_not_for_x25519_key() {
        let rsa = crate::keys::rsa_test_key();
        let x = PrivateKey::generate();
        let wrapped = WrappedKey::seal(&rsa.public_key(), b"secret").unwrap();
        assert!(!wrapped.is_for(&x));
        assert!(matches!(wrapped.open(&x), Err(CryptoError::InvalidKey(_))));
    }
}
