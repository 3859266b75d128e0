//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for direct messages and identity envelopes.
//!
//! Nonces are random 96-bit values from `OsRng`. Every message key in
//! shadowpost is either a long-lived pairwise key (content) or a one-shot
//! ephemeral key (envelopes), and the pairwise case stays far below the
//! ~2^48 birthday bound for random nonces. Don't swap this for a counter
//! without somewhere durable to keep the counter.
//!
//! Callers receive the nonce separately from the ciphertext because the
//! message record stores it in its own field.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};
use crate::error::ShadowError;

/// Errors that can occur during encryption/decryption.
///
/// Deliberately vague. "Wrong key" and "tampered ciphertext" look the same
/// from the outside.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,
}

impl From<EncryptionError> for ShadowError {
    fn from(e: EncryptionError) -> Self {
        ShadowError::Crypto(e.to_string())
    }
}

/// Fresh random nonce.
pub fn random_nonce() -> [u8; AES_NONCE_LENGTH] {
    let mut nonce = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt with a random nonce, binding `aad`. Returns `(nonce, ciphertext)`;
/// the ciphertext carries the 16-byte tag at the end.
pub fn encrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<([u8; AES_NONCE_LENGTH], Vec<u8>), EncryptionError> {
    let nonce = random_nonce();
    let ciphertext = encrypt_with_nonce(key, &nonce, plaintext, aad)?;
    Ok((nonce, ciphertext))
}

/// Encrypt under a caller-supplied nonce.
///
/// Only safe when the key is single-use (ephemeral envelope keys). Anywhere
/// else, use [`encrypt_with_aad`].
pub fn encrypt_with_nonce(
    key: &[u8; AES_KEY_LENGTH],
    nonce: &[u8; AES_NONCE_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)
}

/// Decrypt and authenticate. The nonce and AAD must match encryption time.
pub fn decrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    nonce: &[u8; AES_NONCE_LENGTH],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}
