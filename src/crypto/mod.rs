//! Cryptographic primitives for the secure channel
//!
//! Exposes SRP-6a arithmetic, AEAD message ciphers, BLAKE2 hashing, and
//! X25519 key agreement.

pub mod cipher;
pub mod cpu;
pub mod hash;
pub mod keys;
pub mod srp;

pub use cipher::{MessageCipher, MessageDecryptor, MessageEncryptor, IV_SIZE, KEY_SIZE};
pub use hash::{GenericHash, HashType};
pub use keys::KeyPair;

use thiserror::Error;

/// Failures raised by the crypto layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid key length")]
    InvalidKeyLength,
    #[error("invalid nonce length")]
    InvalidNonceLength,
    #[error("encryption failed")]
    EncryptFailed,
    #[error("decryption failed")]
    DecryptFailed,
    #[error("key agreement failed")]
    KeyAgreement,
    #[error("invalid public value")]
    InvalidPublic,
    #[error("parameter out of range")]
    InvalidParameter,
}
