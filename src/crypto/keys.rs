//! X25519 key agreement and random material.

use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::CryptoError;

/// X25519 private key length.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Asymmetric key pair used to derive a per-connection session secret from
/// the peer's ephemeral public key.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> KeyPair {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        KeyPair { secret, public }
    }

    pub fn from_private_key(private_key: &[u8]) -> Result<KeyPair, CryptoError> {
        let bytes: [u8; PRIVATE_KEY_SIZE] = private_key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Ok(KeyPair { secret, public })
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Diffie-Hellman shared secret with the peer's public key. Rejects
    /// low-order peer keys that would produce a non-contributory result.
    pub fn session_key(&self, peer_public_key: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let bytes: [u8; 32] = peer_public_key
            .try_into()
            .map_err(|_| CryptoError::InvalidPublic)?;
        let shared = self.secret.diffie_hellman(&PublicKey::from(bytes));
        if !shared.was_contributory() {
            return Err(CryptoError::KeyAgreement);
        }
        Ok(Zeroizing::new(shared.as_bytes().to_vec()))
    }
}

/// `len` bytes from the operating system RNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}
