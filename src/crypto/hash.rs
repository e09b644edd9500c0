//! Streaming BLAKE2 hashing, keyed and unkeyed.

use blake2::digest::{FixedOutput, KeyInit, Update};
use blake2::{Blake2b512, Blake2bMac512, Blake2s256, Blake2sMac256, Digest};

use crate::crypto::CryptoError;

/// Digest variants used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    /// 64-byte digest, used for salt synthesis.
    Blake2b512,
    /// 32-byte digest, used for key derivation and SRP hashing.
    Blake2s256,
}

enum Inner {
    B512(Blake2b512),
    S256(Blake2s256),
    B512Keyed(Blake2bMac512),
    S256Keyed(Blake2sMac256),
}

/// Incremental hasher with an `add_data`/`result` interface.
pub struct GenericHash {
    inner: Inner,
}

impl GenericHash {
    pub fn new(hash_type: HashType) -> GenericHash {
        let inner = match hash_type {
            HashType::Blake2b512 => Inner::B512(Blake2b512::new()),
            HashType::Blake2s256 => Inner::S256(Blake2s256::new()),
        };
        GenericHash { inner }
    }

    /// Keyed variant (BLAKE2 MAC mode). Fails when the key exceeds the
    /// digest's key length limit.
    pub fn with_key(hash_type: HashType, key: &[u8]) -> Result<GenericHash, CryptoError> {
        let inner = match hash_type {
            HashType::Blake2b512 => Inner::B512Keyed(
                Blake2bMac512::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?,
            ),
            HashType::Blake2s256 => Inner::S256Keyed(
                Blake2sMac256::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?,
            ),
        };
        Ok(GenericHash { inner })
    }

    pub fn add_data(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::B512(digest) => Digest::update(digest, data),
            Inner::S256(digest) => Digest::update(digest, data),
            Inner::B512Keyed(mac) => Update::update(mac, data),
            Inner::S256Keyed(mac) => Update::update(mac, data),
        }
    }

    pub fn result(self) -> Vec<u8> {
        match self.inner {
            Inner::B512(digest) => digest.finalize().to_vec(),
            Inner::S256(digest) => digest.finalize().to_vec(),
            Inner::B512Keyed(mac) => mac.finalize_fixed().to_vec(),
            Inner::S256Keyed(mac) => mac.finalize_fixed().to_vec(),
        }
    }

    /// One-shot digest of `data`.
    pub fn hash(hash_type: HashType, data: &[u8]) -> Vec<u8> {
        let mut hasher = GenericHash::new(hash_type);
        hasher.add_data(data);
        hasher.result()
    }
}
