//! AES-256-GCM sealing with PBKDF2-derived keys.
//!
//! Sealed layout (before hex/base64 encoding by the envelope layer):
//!
//! ```text
//! salt (64) ‖ nonce (12) ‖ ciphertext (n) ‖ tag (16)
//! ```
//!
//! These sizes and the KDF parameters are wire constants. Changing any of
//! them makes previously stored records undecryptable.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use sha2::Sha512;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::secrets::SecretOrKey;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of the random PBKDF2 salt.
pub const SALT_LEN: usize = 64;

/// Byte length of an AES-GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the AES-GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// PBKDF2-HMAC-SHA-512 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 10_000;

/// Smallest valid sealed buffer: salt, nonce, and tag around an empty message.
pub const MIN_SEALED_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// AES-GCM encryption failed, or decryption failed tag verification.
    #[error("aead operation failed")]
    AeadFailure,

    /// The sealed buffer is too short to hold salt, nonce, and tag.
    #[error("sealed payload is {0} bytes, shorter than the {MIN_SEALED_LEN} byte minimum")]
    Truncated(usize),
}

/// Derive the AES key for `secret` and `salt`.
///
/// Secrets flagged as keys are used directly; everything else goes through
/// PBKDF2-HMAC-SHA-512. The returned buffer is zeroed on drop.
fn derive_key(secret: &SecretOrKey, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CipherError> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    secret.with_material(|material| {
        if secret.is_key() {
            if material.len() != KEY_LEN {
                return Err(CipherError::InvalidKeyLength);
            }
            key.copy_from_slice(material);
        } else {
            pbkdf2::pbkdf2_hmac::<Sha512>(material, salt, PBKDF2_ITERATIONS, &mut key[..]);
        }
        Ok(())
    })?;
    Ok(key)
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm, CipherError> {
    Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength)
}

/// Encrypt `plaintext` under a key derived from `secret`.
///
/// A fresh random salt and nonce are drawn from the OS CSPRNG on every call.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] for a malformed raw key and
/// [`CipherError::AeadFailure`] on an internal AEAD error.
pub fn seal(secret: &SecretOrKey, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(secret, &salt)?;
    let cipher = build_cipher(&key[..])?;

    // aes-gcm appends the 16-byte tag to the ciphertext.
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CipherError::AeadFailure)?;

    let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a buffer produced by [`seal`].
///
/// # Errors
///
/// Returns [`CipherError::Truncated`] if the buffer cannot hold the fixed
/// fields, and [`CipherError::AeadFailure`] if authentication fails (wrong
/// key or tampered data). No plaintext is returned on failure.
pub fn open(secret: &SecretOrKey, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(CipherError::Truncated(sealed.len()));
    }
    let (salt, rest) = sealed.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(secret, salt)?;
    let cipher = build_cipher(&key[..])?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::AeadFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password(secret: &str) -> SecretOrKey {
        SecretOrKey::new(secret, 0)
    }

    #[test]
    fn seal_open_round_trip() {
        let secret = password("pw");
        let sealed = seal(&secret, b"123-45-6789").unwrap();
        assert_eq!(sealed.len(), SALT_LEN + NONCE_LEN + 11 + TAG_LEN);
        assert_eq!(open(&secret, &sealed).unwrap(), b"123-45-6789");
    }

    #[test]
    fn raw_key_round_trip() {
        let secret = SecretOrKey::new("k".repeat(KEY_LEN), 0).as_key();
        let sealed = seal(&secret, b"hello").unwrap();
        assert_eq!(open(&secret, &sealed).unwrap(), b"hello");
    }

    #[test]
    fn raw_key_of_wrong_length_rejected() {
        let secret = SecretOrKey::new("short", 0).as_key();
        assert!(matches!(seal(&secret, b"x"), Err(CipherError::InvalidKeyLength)));
    }

    #[test]
    fn wrong_secret_fails_decryption() {
        let sealed = seal(&password("pw1"), b"secret").unwrap();
        assert!(matches!(open(&password("pw2"), &sealed), Err(CipherError::AeadFailure)));
    }

    #[test]
    fn fresh_salt_and_nonce_per_call() {
        let secret = password("pw");
        let a = seal(&secret, b"same").unwrap();
        let b = seal(&secret, b"same").unwrap();
        assert_ne!(a[..SALT_LEN + NONCE_LEN], b[..SALT_LEN + NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn every_byte_is_authenticated() {
        let secret = password("pw");
        let sealed = seal(&secret, b"tamper me").unwrap();
        // First salt byte, first nonce byte, then every ciphertext and tag byte.
        let positions = [0, SALT_LEN].into_iter().chain(SALT_LEN + NONCE_LEN..sealed.len());
        for i in positions {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x01;
            assert!(open(&secret, &tampered).is_err(), "byte {i} not authenticated");
        }
    }

    #[test]
    fn truncated_buffer_rejected() {
        let secret = password("pw");
        let err = open(&secret, &[0u8; MIN_SEALED_LEN - 1]).unwrap_err();
        assert!(matches!(err, CipherError::Truncated(_)));
    }

    #[test]
    fn pbkdf2_is_deterministic_per_salt() {
        let secret = password("pw");
        let salt = [7u8; SALT_LEN];
        let k1 = derive_key(&secret, &salt).unwrap();
        let k2 = derive_key(&secret, &salt).unwrap();
        let k3 = derive_key(&secret, &[8u8; SALT_LEN]).unwrap();
        assert_eq!(*k1, *k2);
        assert_ne!(*k1, *k3);
    }
}
