/// Errors from layer cryptography.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    /// None of the supplied private keys matches a recipient of the layer.
    #[error("no supplied private key matches any of the {recipients} layer recipient(s)")]
    DecryptionKeyRequired { recipients: usize },

    /// The encryption configuration names no recipients.
    #[error("encryption requires at least one recipient public key")]
    NoRecipients,

    /// A key file could not be decoded or holds an unsupported key.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A private key is password protected but no password was supplied.
    #[error("private key is password protected but no password was supplied")]
    MissingPassword,

    /// A password-protected private key could not be opened.
    #[error("failed to open private key: wrong password or corrupt key file")]
    WrongPassword,

    /// Encryption annotations are missing or cannot be decoded.
    #[error("malformed encryption annotations: {0}")]
    MalformedAnnotations(String),

    /// The layer names a cipher this implementation does not provide.
    #[error("unsupported layer cipher: {0}")]
    UnsupportedCipher(String),

    /// Authenticated decryption failed (tampered, truncated, or wrong key).
    #[error("ciphertext authentication failed: {0}")]
    Authentication(String),

    /// Decrypted content does not hash to the digest recorded at encryption.
    #[error("decrypted content digest mismatch: expected {expected}, computed {computed}")]
    DigestMismatch { expected: String, computed: String },

    /// The media type cannot be transformed in the requested direction.
    #[error("media type {0} cannot be transformed in this direction")]
    UnsupportedMediaType(String),

    /// The system random number generator failed.
    #[error("random number generator failure")]
    Rng,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
