//! AEAD message ciphers installed into the channel after key agreement.
//!
//! Both suites take a 32-byte key and a 12-byte base nonce. The nonce is
//! incremented little-endian across all 12 bytes after every frame, so a
//! (key, nonce) pair is never reused within a direction. Output length is
//! input length plus the 16-byte tag.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::Zeroize;

use crate::crypto::CryptoError;

/// Nonce size shared by both suites.
pub const IV_SIZE: usize = 12;
/// AEAD key size shared by both suites.
pub const KEY_SIZE: usize = 32;
/// Authentication tag appended to every frame.
pub const TAG_SIZE: usize = 16;

/// Encrypts outbound messages; owned by the channel once installed.
pub trait MessageEncryptor: Send {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Decrypts inbound messages; owned by the channel once installed.
pub trait MessageDecryptor: Send {
    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

enum Suite {
    Aes256Gcm(Box<Aes256Gcm>),
    ChaCha20Poly1305(Box<ChaCha20Poly1305>),
}

/// One direction of an encrypted channel: an AEAD instance plus a rolling
/// nonce. Implements both cipher traits; the authenticator installs one
/// instance per direction.
pub struct MessageCipher {
    suite: Suite,
    nonce: [u8; IV_SIZE],
}

impl MessageCipher {
    pub fn aes256_gcm(key: &[u8], iv: &[u8]) -> Result<MessageCipher, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(MessageCipher {
            suite: Suite::Aes256Gcm(Box::new(cipher)),
            nonce: Self::base_nonce(iv)?,
        })
    }

    pub fn chacha20_poly1305(key: &[u8], iv: &[u8]) -> Result<MessageCipher, CryptoError> {
        let cipher =
            ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(MessageCipher {
            suite: Suite::ChaCha20Poly1305(Box::new(cipher)),
            nonce: Self::base_nonce(iv)?,
        })
    }

    fn base_nonce(iv: &[u8]) -> Result<[u8; IV_SIZE], CryptoError> {
        if iv.len() != IV_SIZE {
            return Err(CryptoError::InvalidNonceLength);
        }
        let mut nonce = [0u8; IV_SIZE];
        nonce.copy_from_slice(iv);
        Ok(nonce)
    }

    fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(&self.nonce);
        let sealed = match &self.suite {
            Suite::Aes256Gcm(cipher) => cipher.encrypt(nonce, plaintext),
            Suite::ChaCha20Poly1305(cipher) => cipher.encrypt(nonce, plaintext),
        }
        .map_err(|_| CryptoError::EncryptFailed)?;

        self.advance();
        Ok(sealed)
    }

    fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(&self.nonce);
        let opened = match &self.suite {
            Suite::Aes256Gcm(cipher) => cipher.decrypt(nonce, ciphertext),
            Suite::ChaCha20Poly1305(cipher) => cipher.decrypt(nonce, ciphertext),
        }
        .map_err(|_| CryptoError::DecryptFailed)?;

        self.advance();
        Ok(opened)
    }

    // Little-endian increment over the full 96-bit nonce.
    fn advance(&mut self) {
        for byte in self.nonce.iter_mut() {
            let (next, carry) = byte.overflowing_add(1);
            *byte = next;
            if !carry {
                break;
            }
        }
    }
}

impl MessageEncryptor for MessageCipher {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.seal(plaintext)
    }
}

impl MessageDecryptor for MessageCipher {
    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.open(ciphertext)
    }
}

impl Drop for MessageCipher {
    fn drop(&mut self) {
        self.nonce.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_SIZE] = [7u8; KEY_SIZE];
    const IV: [u8; IV_SIZE] = [1u8; IV_SIZE];

    #[test]
    fn test_aes_round_trip() {
        let mut encryptor = MessageCipher::aes256_gcm(&KEY, &IV).expect("valid params");
        let mut decryptor = MessageCipher::aes256_gcm(&KEY, &IV).expect("valid params");

        let sealed = encryptor.encrypt(b"attack at dawn").expect("encrypt");
        assert_eq!(sealed.len(), b"attack at dawn".len() + TAG_SIZE);
        assert_eq!(decryptor.decrypt(&sealed).expect("decrypt"), b"attack at dawn");
    }

    #[test]
    fn test_chacha_round_trip() {
        let mut encryptor = MessageCipher::chacha20_poly1305(&KEY, &IV).expect("valid params");
        let mut decryptor = MessageCipher::chacha20_poly1305(&KEY, &IV).expect("valid params");

        let sealed = encryptor.encrypt(b"retreat at dusk").expect("encrypt");
        assert_eq!(decryptor.decrypt(&sealed).expect("decrypt"), b"retreat at dusk");
    }

    #[test]
    fn test_nonce_advances_per_frame() {
        let mut encryptor = MessageCipher::aes256_gcm(&KEY, &IV).expect("valid params");

        let first = encryptor.encrypt(b"same payload").expect("encrypt");
        let second = encryptor.encrypt(b"same payload").expect("encrypt");
        assert_ne!(first, second);

        // A decryptor consuming frames in order recovers both.
        let mut decryptor = MessageCipher::aes256_gcm(&KEY, &IV).expect("valid params");
        assert_eq!(decryptor.decrypt(&first).expect("decrypt"), b"same payload");
        assert_eq!(decryptor.decrypt(&second).expect("decrypt"), b"same payload");
    }

    #[test]
    fn test_out_of_order_frame_rejected() {
        let mut encryptor = MessageCipher::chacha20_poly1305(&KEY, &IV).expect("valid params");
        let _skipped = encryptor.encrypt(b"first").expect("encrypt");
        let second = encryptor.encrypt(b"second").expect("encrypt");

        let mut decryptor = MessageCipher::chacha20_poly1305(&KEY, &IV).expect("valid params");
        assert!(decryptor.decrypt(&second).is_err());
    }

    #[test]
    fn test_bad_key_and_nonce_sizes() {
        assert_eq!(
            MessageCipher::aes256_gcm(&KEY[..16], &IV).err(),
            Some(CryptoError::InvalidKeyLength)
        );
        assert_eq!(
            MessageCipher::chacha20_poly1305(&KEY, &IV[..8]).err(),
            Some(CryptoError::InvalidNonceLength)
        );
    }

    #[test]
    fn test_tampered_frame_rejected() {
        let mut encryptor = MessageCipher::aes256_gcm(&KEY, &IV).expect("valid params");
        let mut decryptor = MessageCipher::aes256_gcm(&KEY, &IV).expect("valid params");

        let mut sealed = encryptor.encrypt(b"payload").expect("encrypt");
        sealed[0] ^= 0xff;
        assert!(decryptor.decrypt(&sealed).is_err());
    }
}
