//! Layer cryptography for imgseal.
//!
//! Provides the pluggable byte-level transform applied to selected image
//! layers: a chunked AES-256-GCM layer cipher, X25519 and RSA recipient keys,
//! password-protected key files, per-recipient key wrapping, and the
//! layer-level encrypt/decrypt/add-recipients operations that read and write
//! descriptor annotations.
//!
//! All primitives come from established libraries.

pub mod cipher;
pub mod config;
pub mod error;
pub mod keys;
pub mod layer;
pub mod wrap;

pub use cipher::{SymmetricKey, CIPHER_AES_256_GCM_CHUNKED, DEFAULT_CHUNK_SIZE};
pub use config::{CryptoConfig, DecryptConfig, EncryptConfig, Parameters};
pub use error::{CryptoError, CryptoResult};
pub use keys::{generate_key_files, generate_rsa_key_files, KeyScheme, PrivateKey, PublicKey};
pub use layer::{
    add_recipients, decrypt_layer, encrypt_layer, keys_annotation, recipients, unwrap_layer_key,
    DecryptedLayer, EncryptedLayer, PrivateOptions, PublicOptions, ANNOTATION_KEYS,
    ANNOTATION_KEYS_RSA, ANNOTATION_PUBOPTS,
};
pub use wrap::WrappedKey;
