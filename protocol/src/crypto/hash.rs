//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **SHA-256**: for everything that has to match across clients bit for
//!   bit: identity seeds, record keys, bid vault addresses, idempotency tags.
//!   Every other implementation on the planet has SHA-256, so that's what
//!   the derivation scheme is written in.
//!
//! - **BLAKE3 `derive_key`**: for turning Diffie-Hellman output into AEAD
//!   keys. The context string is mixed into the IV, so a content key and an
//!   envelope key can never collide even when fed the same shared secret.
//!
//! Multi-part hashers feed slices sequentially instead of concatenating.
//! `sha256_multi(&[a, b])` is exactly `sha256(a || b)`, which is what the
//! layouts in [`crate::ledger::records`] are defined as.

use sha2::{Digest, Sha256};

/// SHA-256 of a single buffer.
///
/// # Example
///
/// ```
/// use shadowpost_protocol::crypto::sha256;
///
/// let hash = sha256(b"shadowpost");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over the concatenation of `parts`, without building the
/// concatenation.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Plain BLAKE3. Used for fingerprints that never leave the process.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// BLAKE3 in `derive_key` mode over the concatenation of `parts`.
///
/// `context` must be a hardcoded, globally unique string. Never build it
/// from user input. See the context constants in [`crate::config`].
pub fn derive_key(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}
