//! Layer-level encrypt, decrypt, and recipient management.
//!
//! An encrypted layer carries two annotations:
//!
//! - [`ANNOTATION_KEYS`] and [`ANNOTATION_KEYS_RSA`]: one wrapped copy of the
//!   layer's private options per X25519 or RSA recipient, comma separated.
//!   At least one of the two is present.
//! - [`ANNOTATION_PUBOPTS`]: the public cipher options (cipher name and chunk
//!   size), base64 JSON.
//!
//! The private options hold the layer's content key and the digest of the
//! plaintext, so a successful decrypt is verified end to end.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use imgseal_types::media::{decrypted_media_type, encrypted_media_type, is_encrypted_layer};
use imgseal_types::{Annotations, Digest};

use crate::cipher::{open_chunks, seal_chunks, SymmetricKey, CIPHER_AES_256_GCM_CHUNKED};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{KeyScheme, PrivateKey, PublicKey};
use crate::wrap::{decode_wrapped_keys, encode_wrapped_keys, WrappedKey};

/// Annotation holding the wrapped keys of X25519 recipients.
pub const ANNOTATION_KEYS: &str = "org.opencontainers.image.enc.keys.x25519";

/// Annotation holding the wrapped keys of RSA recipients.
pub const ANNOTATION_KEYS_RSA: &str = "org.opencontainers.image.enc.keys.rsa";

/// The annotation carrying wrapped keys of `scheme`.
pub fn keys_annotation(scheme: KeyScheme) -> &'static str {
    match scheme {
        KeyScheme::X25519 => ANNOTATION_KEYS,
        KeyScheme::Rsa => ANNOTATION_KEYS_RSA,
    }
}

/// Annotation holding the public cipher options.
pub const ANNOTATION_PUBOPTS: &str = "org.opencontainers.image.enc.pubopts";

/// Cipher options stored in the clear next to the layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicOptions {
    pub cipher: String,
    pub chunk_size: u32,
}

/// Options only recipients can read.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateOptions {
    /// Content key (base64).
    pub symmetric_key: String,
    /// Digest of the plaintext layer.
    pub digest: Digest,
}

impl PrivateOptions {
    fn key(&self) -> CryptoResult<SymmetricKey> {
        let bytes = STANDARD
            .decode(&self.symmetric_key)
            .map_err(|e| CryptoError::MalformedAnnotations(format!("symmetric key: {e}")))?;
        SymmetricKey::from_slice(&bytes)
    }

    fn to_vec(&self) -> CryptoResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CryptoError::Serialization(e.to_string()))
    }

    fn from_slice(data: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice(data)
            .map_err(|e| CryptoError::MalformedAnnotations(format!("private options: {e}")))
    }
}

impl std::fmt::Debug for PrivateOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateOptions")
            .field("symmetric_key", &"<redacted>")
            .field("digest", &self.digest)
            .finish()
    }
}

/// Result of encrypting a plain layer.
#[derive(Clone, Debug)]
pub struct EncryptedLayer {
    pub data: Vec<u8>,
    pub media_type: String,
    pub annotations: Annotations,
    pub digest: Digest,
    pub size: u64,
}

/// Result of decrypting an encrypted layer.
#[derive(Clone, Debug)]
pub struct DecryptedLayer {
    pub data: Vec<u8>,
    pub media_type: String,
    /// The input annotations with the encryption annotations removed, or
    /// `None` if nothing else remains.
    pub annotations: Option<Annotations>,
    pub digest: Digest,
    pub size: u64,
}

/// Encrypt a plain layer for every recipient.
pub fn encrypt_layer(
    plain: &[u8],
    media_type: &str,
    annotations: Option<&Annotations>,
    recipients: &[PublicKey],
    chunk_size: u32,
) -> CryptoResult<EncryptedLayer> {
    let target = encrypted_media_type(media_type)
        .ok_or_else(|| CryptoError::UnsupportedMediaType(media_type.to_string()))?;
    if recipients.is_empty() {
        return Err(CryptoError::NoRecipients);
    }

    let key = SymmetricKey::generate()?;
    let data = seal_chunks(&key, plain, chunk_size)?;
    let private = PrivateOptions {
        symmetric_key: STANDARD.encode(key.as_bytes()),
        digest: Digest::of(plain),
    }
    .to_vec()?;
    let wrapped = recipients
        .iter()
        .map(|r| WrappedKey::seal(r, &private))
        .collect::<CryptoResult<Vec<_>>>()?;

    let mut out = annotations.cloned().unwrap_or_default();
    set_wrapped_keys(&mut out, &wrapped)?;
    out.insert(
        ANNOTATION_PUBOPTS.to_string(),
        encode_public_options(&PublicOptions {
            cipher: CIPHER_AES_256_GCM_CHUNKED.to_string(),
            chunk_size,
        })?,
    );
    debug!(
        media_type = target,
        recipients = recipients.len(),
        plain_size = plain.len(),
        "encrypted layer"
    );
    Ok(EncryptedLayer {
        digest: Digest::of(&data),
        size: data.len() as u64,
        data,
        media_type: target.to_string(),
        annotations: out,
    })
}

/// Decrypt an encrypted layer with whichever private key matches a recipient.
pub fn decrypt_layer(
    cipher: &[u8],
    media_type: &str,
    annotations: Option<&Annotations>,
    keys: &[PrivateKey],
) -> CryptoResult<DecryptedLayer> {
    let target = decrypted_media_type(media_type)
        .ok_or_else(|| CryptoError::UnsupportedMediaType(media_type.to_string()))?;
    let public = public_options(annotations)?;
    let private = unwrap_layer_key(annotations, keys)?;
    let data = open_chunks(&private.key()?, cipher, public.chunk_size)?;

    let computed = Digest::of(&data);
    if computed != private.digest {
        return Err(CryptoError::DigestMismatch {
            expected: private.digest.to_string(),
            computed: computed.to_string(),
        });
    }

    let remaining = annotations.cloned().map(strip_encryption_annotations);
    Ok(DecryptedLayer {
        digest: computed,
        size: data.len() as u64,
        data,
        media_type: target.to_string(),
        annotations: remaining.filter(|a| !a.is_empty()),
    })
}

/// Unwrap the private options with the first private key that matches a
/// recipient record.
///
/// Fails with [`CryptoError::DecryptionKeyRequired`] when no key matches any
/// record. If keys match but every unwrap fails, the last failure surfaces.
pub fn unwrap_layer_key(
    annotations: Option<&Annotations>,
    keys: &[PrivateKey],
) -> CryptoResult<PrivateOptions> {
    let records = wrapped_keys(annotations)?;
    let mut last_error = None;
    for key in keys {
        for record in records.iter().filter(|r| r.is_for(key)) {
            match record.open(key).and_then(|raw| PrivateOptions::from_slice(&raw)) {
                Ok(options) => return Ok(options),
                Err(e) => last_error = Some(e),
            }
        }
    }
    Err(last_error.unwrap_or(CryptoError::DecryptionKeyRequired {
        recipients: records.len(),
    }))
}

/// Wrap an encrypted layer's key for additional recipients.
///
/// Existing recipients are always kept. Returns `Ok(None)` when every
/// requested recipient can already open the layer; otherwise the layer key is
/// unwrapped with `keys` and the updated annotations are returned. The layer
/// bytes themselves are unchanged.
pub fn add_recipients(
    media_type: &str,
    annotations: Option<&Annotations>,
    recipients: &[PublicKey],
    keys: &[PrivateKey],
) -> CryptoResult<Option<Annotations>> {
    if !is_encrypted_layer(media_type) {
        return Err(CryptoError::UnsupportedMediaType(media_type.to_string()));
    }
    let mut records = wrapped_keys(annotations)?;
    let missing: Vec<&PublicKey> = recipients
        .iter()
        .filter(|r| {
            let fp = r.fingerprint();
            !records.iter().any(|rec| rec.recipient == fp)
        })
        .collect();
    if missing.is_empty() {
        return Ok(None);
    }

    let private = unwrap_layer_key(annotations, keys)?.to_vec()?;
    for recipient in &missing {
        records.push(WrappedKey::seal(recipient, &private)?);
    }
    let mut out = annotations.cloned().unwrap_or_default();
    set_wrapped_keys(&mut out, &records)?;
    debug!(added = missing.len(), total = records.len(), "added layer recipients");
    Ok(Some(out))
}

/// Fingerprints of every recipient an encrypted layer is wrapped for.
pub fn recipients(annotations: Option<&Annotations>) -> CryptoResult<Vec<String>> {
    Ok(wrapped_keys(annotations)?
        .into_iter()
        .map(|r| r.recipient)
        .collect())
}

/// Remove the encryption annotations, keeping everything else.
pub fn strip_encryption_annotations(mut annotations: Annotations) -> Annotations {
    for scheme in KeyScheme::ALL {
        annotations.remove(keys_annotation(scheme));
    }
    annotations.remove(ANNOTATION_PUBOPTS);
    annotations
}

fn wrapped_keys(annotations: Option<&Annotations>) -> CryptoResult<Vec<WrappedKey>> {
    let annotations = annotations.ok_or_else(|| {
        CryptoError::MalformedAnnotations(format!("missing {ANNOTATION_KEYS}"))
    })?;
    let mut records = Vec::new();
    let mut present = false;
    for scheme in KeyScheme::ALL {
        if let Some(value) = annotations.get(keys_annotation(scheme)) {
            present = true;
            records.extend(decode_wrapped_keys(value, scheme)?);
        }
    }
    if !present {
        return Err(CryptoError::MalformedAnnotations(format!(
            "missing {ANNOTATION_KEYS} or {ANNOTATION_KEYS_RSA}"
        )));
    }
    if records.is_empty() {
        return Err(CryptoError::MalformedAnnotations(
            "layer has no wrapped keys".into(),
        ));
    }
    Ok(records)
}

// Records are grouped into one annotation per scheme; schemes with no records
// lose their annotation.
fn set_wrapped_keys(out: &mut Annotations, records: &[WrappedKey]) -> CryptoResult<()> {
    for scheme in KeyScheme::ALL {
        let group: Vec<WrappedKey> = records
            .iter()
            .filter(|r| r.scheme == scheme)
            .cloned()
            .collect();
        if group.is_empty() {
            out.remove(keys_annotation(scheme));
        } else {
            out.insert(keys_annotation(scheme).to_string(), encode_wrapped_keys(&group)?);
        }
    }
    Ok(())
}

fn encode_public_options(options: &PublicOptions) -> CryptoResult<String> {
    let json = serde_json::to_vec(options).map_err(|e| CryptoError::Serialization(e.to_string()))?;
    Ok(STANDARD.encode(json))
}

fn public_options(annotations: Option<&Annotations>) -> CryptoResult<PublicOptions> {
    let value = annotations
        .and_then(|a| a.get(ANNOTATION_PUBOPTS))
        .ok_or_else(|| {
            CryptoError::MalformedAnnotations(format!("missing {ANNOTATION_PUBOPTS}"))
        })?;
    let json = STANDARD
        .decode(value)
        .map_err(|e| CryptoError::MalformedAnnotations(format!("public options: {e}")))?;
    let options: PublicOptions = serde_json::from_slice(&json)
        .map_err(|e| CryptoError::MalformedAnnotations(format!("public options: {e}")))?;
    if options.cipher != CIPHER_AES_256_GCM_CHUNKED {
        return Err(CryptoError::UnsupportedCipher(options.cipher));
    }
    Ok(options)
}
