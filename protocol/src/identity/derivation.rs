//! # Shadow Key Derivation
//!
//! Every shadow identity is a pure function of three inputs:
//!
//! ```text
//! seed    = SHA-256(master_signature[64] || hashed_user_id[32] || index u32 LE)
//! signing = Ed25519 SigningKey::from_bytes(seed)
//! msg     = X25519 StaticSecret(SHA-256(signing_secret || "msg-v1"))
//! ```
//!
//! The master signature is the primary wallet's Ed25519 signature over
//! [`MASTER_CHALLENGE_MESSAGE`](crate::config::MASTER_CHALLENGE_MESSAGE).
//! Ed25519 signing is deterministic, so the same wallet always produces the
//! same signature, and therefore the same shadow keys, on any device. Nothing
//! secret is ever persisted; lose the device and the identities come back the
//! moment the wallet signs again.
//!
//! The layout above is a compatibility contract. Other clients derive the
//! same keys from the same inputs; change one byte and every user's shadow
//! identities vanish.

use zeroize::Zeroizing;

use crate::config::{HASHED_USER_ID_LENGTH, MESSAGING_KEY_DOMAIN, SIGNATURE_LENGTH};
use crate::crypto::hash::sha256_multi;
use crate::crypto::{MessagingKeypair, ShadowKeypair};
use crate::error::{Result, ShadowError};

/// Derive the signing keypair for shadow identity `index`.
///
/// Fails with `InvalidInput` when `signature` is not 64 bytes or
/// `hashed_user_id` is not a 32-byte digest.
pub fn derive_signing_keypair(
    signature: &[u8],
    hashed_user_id: &[u8],
    index: u32,
) -> Result<ShadowKeypair> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(ShadowError::InvalidInput(format!(
            "master signature must be {} bytes, got {}",
            SIGNATURE_LENGTH,
            signature.len()
        )));
    }
    if hashed_user_id.is_empty() {
        return Err(ShadowError::InvalidInput("hashed user id is empty".into()));
    }
    if hashed_user_id.len() != HASHED_USER_ID_LENGTH {
        return Err(ShadowError::InvalidInput(format!(
            "hashed user id must be {} bytes, got {}",
            HASHED_USER_ID_LENGTH,
            hashed_user_id.len()
        )));
    }

    let seed = Zeroizing::new(sha256_multi(&[
        signature,
        hashed_user_id,
        &index.to_le_bytes(),
    ]));
    Ok(ShadowKeypair::from_seed(&seed))
}

/// Derive the X25519 messaging keypair bound to a shadow signing key.
///
/// Not computable from the signing *public* key, and distinct from the
/// signing secret, so leaking one doesn't hand over the other.
pub fn derive_messaging_keypair(signing: &ShadowKeypair) -> MessagingKeypair {
    let secret = signing.secret_bytes();
    let seed = Zeroizing::new(sha256_multi(&[secret.as_slice(), MESSAGING_KEY_DOMAIN]));
    MessagingKeypair::from_seed(*seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256;

    fn inputs() -> ([u8; 64], [u8; 32]) {
        ([0x11; 64], sha256(b"user-42"))
    }

    #[test]
    fn same_inputs_same_keypair() {
        let (sig, uid) = inputs();
        let a = derive_signing_keypair(&sig, &uid, 0).unwrap();
        let b = derive_signing_keypair(&sig, &uid, 0).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn seed_layout_is_stable() {
        // Pin the exact construction so a refactor can't silently move keys.
        let (sig, uid) = inputs();
        let mut concat = Vec::new();
        concat.extend_from_slice(&sig);
        concat.extend_from_slice(&uid);
        concat.extend_from_slice(&7u32.to_le_bytes());
        let expected = ShadowKeypair::from_seed(&sha256(&concat));
        let derived = derive_signing_keypair(&sig, &uid, 7).unwrap();
        assert_eq!(derived.public_key(), expected.public_key());
    }

    #[test]
    fn indices_user_ids_and_signatures_separate_keys() {
        let (sig, uid) = inputs();
        let base = derive_signing_keypair(&sig, &uid, 0).unwrap().public_key();
        let next = derive_signing_keypair(&sig, &uid, 1).unwrap().public_key();
        let other_user = derive_signing_keypair(&sig, &sha256(b"user-43"), 0)
            .unwrap()
            .public_key();
        let other_sig = derive_signing_keypair(&[0x12; 64], &uid, 0)
            .unwrap()
            .public_key();
        assert_ne!(base, next);
        assert_ne!(base, other_user);
        assert_ne!(base, other_sig);
    }

    #[test]
    fn rejects_malformed_inputs() {
        let (sig, uid) = inputs();
        assert!(matches!(
            derive_signing_keypair(&sig[..63], &uid, 0),
            Err(ShadowError::InvalidInput(_))
        ));
        assert!(matches!(
            derive_signing_keypair(&sig, &[], 0),
            Err(ShadowError::InvalidInput(_))
        ));
        assert!(matches!(
            derive_signing_keypair(&sig, &uid[..31], 0),
            Err(ShadowError::InvalidInput(_))
        ));
    }

    #[test]
    fn messaging_key_is_separate_but_deterministic() {
        let (sig, uid) = inputs();
        let signing = derive_signing_keypair(&sig, &uid, 3).unwrap();
        let m1 = derive_messaging_keypair(&signing);
        let m2 = derive_messaging_keypair(&signing);
        assert_eq!(m1.public_key(), m2.public_key());
        assert_ne!(m1.public_key().as_bytes(), signing.public_key().as_bytes());

        let other = derive_signing_keypair(&sig, &uid, 4).unwrap();
        assert_ne!(derive_messaging_keypair(&other).public_key(), m1.public_key());
    }
}
