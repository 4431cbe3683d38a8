//! Chunked AES-256-GCM layer cipher.
//!
//! A layer is split into fixed-size chunks. Each chunk is sealed under the
//! layer's content key with a counter nonce; the chunk index and a final-chunk
//! flag are bound as additional authenticated data, so reordering, dropping,
//! or truncating chunks fails authentication.
//!
//! Ciphertext layout: `chunk_0 || tag_0 || chunk_1 || tag_1 || ...` where every
//! chunk except the last holds exactly `chunk_size` plaintext bytes. An empty
//! layer still produces one (empty) final chunk.

use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{CryptoError, CryptoResult};

/// Identifier recorded in the public layer options.
pub const CIPHER_AES_256_GCM_CHUNKED: &str = "AES_256_GCM_CHUNKED";

/// Default plaintext bytes per chunk.
pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;

/// Largest chunk size accepted when decoding layer options.
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

/// Authentication tag appended to every chunk.
pub const TAG_LEN: usize = 16;

/// A per-layer 256-bit content key.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Generate a fresh random key.
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = [0u8; 32];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| CryptoError::Rng)?;
        Ok(Self(bytes))
    }

    /// Create from a decoded key; the slice must be 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::MalformedAnnotations(format!(
                "symmetric key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey(<redacted>)")
    }
}

/// Seal `plaintext` chunk by chunk.
pub fn seal_chunks(key: &SymmetricKey, plaintext: &[u8], chunk_size: u32) -> CryptoResult<Vec<u8>> {
    let chunk_size = checked_chunk_size(chunk_size)?;
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key.as_bytes())
        .map_err(|_| CryptoError::Authentication("failed to create AES-256-GCM key".into()))?;
    let mut sealing = aead::SealingKey::new(unbound, CounterNonces::default());

    let chunk_count = plaintext.len().div_ceil(chunk_size).max(1);
    let mut out = Vec::with_capacity(plaintext.len() + chunk_count * TAG_LEN);
    for index in 0..chunk_count {
        let start = index * chunk_size;
        let end = (start + chunk_size).min(plaintext.len());
        let mut in_out = plaintext[start..end].to_vec();
        let aad = chunk_aad(index as u64, index + 1 == chunk_count);
        sealing
            .seal_in_place_append_tag(Aad::from(aad), &mut in_out)
            .map_err(|_| CryptoError::Authentication(format!("sealing chunk {index} failed")))?;
        out.extend_from_slice(&in_out);
    }
    Ok(out)
}

/// Open a ciphertext produced by [`seal_chunks`] with the same chunk size.
pub fn open_chunks(
    key: &SymmetricKey,
    ciphertext: &[u8],
    chunk_size: u32,
) -> CryptoResult<Vec<u8>> {
    let chunk_size = checked_chunk_size(chunk_size)?;
    if ciphertext.is_empty() {
        return Err(CryptoError::Authentication("ciphertext is empty".into()));
    }
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key.as_bytes())
        .map_err(|_| CryptoError::Authentication("failed to create AES-256-GCM key".into()))?;
    let mut opening = aead::OpeningKey::new(unbound, CounterNonces::default());

    let segments: Vec<&[u8]> = ciphertext.chunks(chunk_size + TAG_LEN).collect();
    let mut out = Vec::with_capacity(ciphertext.len());
    for (index, segment) in segments.iter().enumerate() {
        if segment.len() < TAG_LEN {
            return Err(CryptoError::Authentication(format!(
                "chunk {index} shorter than its tag"
            )));
        }
        let mut in_out = segment.to_vec();
        let aad = chunk_aad(index as u64, index + 1 == segments.len());
        let plain = opening
            .open_in_place(Aad::from(aad), &mut in_out)
            .map_err(|_| CryptoError::Authentication(format!("chunk {index} failed to open")))?;
        out.extend_from_slice(plain);
    }
    Ok(out)
}

fn checked_chunk_size(chunk_size: u32) -> CryptoResult<usize> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(CryptoError::MalformedAnnotations(format!(
            "chunk size {chunk_size} out of range"
        )));
    }
    Ok(chunk_size as usize)
}

fn chunk_aad(index: u64, last: bool) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[..8].copy_from_slice(&index.to_be_bytes());
    aad[8] = u8::from(last);
    aad
}

// ============================================================================
// ring nonce sequences
// ============================================================================

/// Yields `0^4 || counter_be64` nonces. Safe because every layer key is fresh.
#[derive(Default)]
struct CounterNonces {
    next: u64,
}

impl NonceSequence for CounterNonces {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[4..].copy_from_slice(&self.next.to_be_bytes());
        self.next = self.next.checked_add(1).ok_or(ring::error::Unspecified)?;
        Ok(Nonce::assume_unique_for_key(nonce))
    }
}

/// A NonceSequence that yields a single nonce then fails.
pub(crate) struct SingleNonce {
    nonce: Option<[u8; NONCE_LEN]>,
}

impl SingleNonce {
    pub(crate) fn new(nonce: [u8; NONCE_LEN]) -> Self {
        Self { nonce: Some(nonce) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        self.nonce
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

/// Seal a short message under a one-off key with a random nonce.
///
/// Returns `(nonce, ciphertext || tag)`.
pub(crate) fn seal_once(
    key: &[u8; 32],
    aad: &[u8],
    plaintext: &[u8],
) -> CryptoResult<([u8; NONCE_LEN], Vec<u8>)> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| CryptoError::Rng)?;
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Authentication("failed to create AES-256-GCM key".into()))?;
    let mut sealing = aead::SealingKey::new(unbound, SingleNonce::new(nonce));
    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::Authentication("seal failed".into()))?;
    Ok((nonce, in_out))
}

/// Open a message sealed by [`seal_once`].
pub(crate) fn open_once(
    key: &[u8; 32],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let nonce: [u8; NONCE_LEN] = nonce
        .try_into()
        .map_err(|_| CryptoError::Authentication(format!("nonce must be {NONCE_LEN} bytes")))?;
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Authentication("failed to create AES-256-GCM key".into()))?;
    let mut opening = aead::OpeningKey::new(unbound, SingleNonce::new(nonce));
    let mut in_out = ciphertext.to_vec();
    let plain = opening
        .open_in_place(Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::Authentication("open failed".into()))?;
    Ok(plain.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn seal_open_multi_chunk() {
        let key = SymmetricKey::generate().unwrap();
        let plain: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let sealed = seal_chunks(&key, &plain, 1024).unwrap();
        assert_eq!(sealed.len(), plain.len() + 10 * TAG_LEN);
        assert_eq!(open_chunks(&key, &sealed, 1024).unwrap(), plain);
    }

    #[test]
    fn empty_plaintext_has_one_final_chunk() {
        let key = SymmetricKey::generate().unwrap();
        let sealed = seal_chunks(&key, b"", 1024).unwrap();
        assert_eq!(sealed.len(), TAG_LEN);
        assert!(open_chunks(&key, &sealed, 1024).unwrap().is_empty());
    }

    #[test]
    fn exact_multiple_of_chunk_size() {
        let key = SymmetricKey::generate().unwrap();
        let plain = vec![7u8; 2048];
        let sealed = seal_chunks(&key, &plain, 1024).unwrap();
        assert_eq!(sealed.len(), 2048 + 2 * TAG_LEN);
        assert_eq!(open_chunks(&key, &sealed, 1024).unwrap(), plain);
    }

    #[test]
    fn truncation_at_chunk_boundary_is_detected() {
        let key = SymmetricKey::generate().unwrap();
        let plain = vec![1u8; 3000];
        let sealed = seal_chunks(&key, &plain, 1024).unwrap();
        let truncated = &sealed[..2 * (1024 + TAG_LEN)];
        assert!(matches!(
            open_chunks(&key, truncated, 1024),
            Err(CryptoError::Authentication(_))
        ));
    }

    #[test]
    fn swapped_chunks_are_detected() {
        let key = SymmetricKey::generate().unwrap();
        let plain: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();
        let sealed = seal_chunks(&key, &plain, 1024).unwrap();
        let seg = 1024 + TAG_LEN;
        let mut swapped = sealed.clone();
        swapped[..seg].copy_from_slice(&sealed[seg..2 * seg]);
        swapped[seg..2 * seg].copy_from_slice(&sealed[..seg]);
        assert!(open_chunks(&key, &swapped, 1024).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let key = SymmetricKey::generate().unwrap();
        let other = SymmetricKey::generate().unwrap();
        let sealed = seal_chunks(&key, b"secret layer", 1024).unwrap();
        assert!(open_chunks(&other, &sealed, 1024).is_err());
    }

    #[test]
    fn chunk_size_mismatch_fails() {
        let key = SymmetricKey::generate().unwrap();
        let sealed = seal_chunks(&key, &[3u8; 5000], 1024).unwrap();
        assert!(open_chunks(&key, &sealed, 2048).is_err());
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let key = SymmetricKey::generate().unwrap();
        assert!(seal_chunks(&key, b"x", 0).is_err());
    }

    #[test]
    fn seal_once_roundtrip_and_aad_binding() {
        let key = [9u8; 32];
        let (nonce, ct) = seal_once(&key, b"aad", b"payload").unwrap();
        assert_eq!(open_once(&key, &nonce, b"aad", &ct).unwrap(), b"payload");
        assert!(open_once(&key, &nonce, b"other", &ct).is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let key = SymmetricKey::generate().unwrap();
        assert!(format!("{key:?}").contains("redacted"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn open_inverts_seal(
            plain in proptest::collection::vec(any::<u8>(), 0..4096),
            chunk_size in 1u32..2048,
        ) {
            let key = SymmetricKey::generate().unwrap();
            let sealed = seal_chunks(&key, &plain, chunk_size).unwrap();
            prop_assert_eq!(open_chunks(&key, &sealed, chunk_size).unwrap(), plain);
        }
    }
}
