//! # Key Management
//!
//! Ed25519 keys for shadow identities, primary wallets and ledger
//! accounts. One type for all three: the ledger doesn't care who derived a
//! key, only that it signs.
//!
//! ## Security considerations
//!
//! - Shadow keypairs are never generated randomly in production. They are
//!   re-derived on demand from the session master secret (see
//!   [`crate::identity::derivation`]) and dropped as soon as the signature is
//!   made. `generate()` exists for wallets in tests and the CLI simulator.
//! - Secret bytes come back wrapped in [`Zeroizing`] so they're wiped when
//!   the caller is done with them.
//! - Key bytes are never logged. `Debug` prints the public half only.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::error::ShadowError;

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid base58 encoding")]
    InvalidEncoding,

    #[error("invalid signature length: expected 64 bytes, got {0}")]
    InvalidSignatureLength(usize),
}

impl From<KeyError> for ShadowError {
    fn from(e: KeyError) -> Self {
        ShadowError::Crypto(e.to_string())
    }
}

/// An Ed25519 keypair.
///
/// Intentionally not `Serialize`. If you need the secret, call
/// [`ShadowKeypair::secret_bytes`] and own the consequences.
pub struct ShadowKeypair {
    signing_key: SigningKey,
}

/// A 32-byte Ed25519 public key. Displays as base58, the way every Solana
/// wallet prints an address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShadowPublicKey {
    bytes: [u8; 32],
}

/// A 64-byte Ed25519 signature.
///
/// Stored as `Vec<u8>` because serde stops deriving fixed arrays at 32.
/// A signature of any other length simply fails to verify.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShadowSignature {
    bytes: Vec<u8>,
}

impl ShadowKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. The seed *is* the Ed25519
    /// secret key.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> ShadowPublicKey {
        ShadowPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Ed25519 is deterministic: same key, same message, same signature.
    pub fn sign(&self, message: &[u8]) -> ShadowSignature {
        ShadowSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, message: &[u8], signature: &ShadowSignature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Raw secret key bytes, wiped on drop.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl Clone for ShadowKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for ShadowKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShadowKeypair(pub={})", self.public_key())
    }
}

// ---------------------------------------------------------------------------
// ShadowPublicKey
// ---------------------------------------------------------------------------

impl ShadowPublicKey {
    /// Wrap raw bytes. No curve check; use [`try_from_slice`](Self::try_from_slice)
    /// for untrusted input. `const` so fixed addresses can live in constants.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Parse untrusted bytes, rejecting wrong lengths and non-points.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.bytes
    }

    /// `true` only for a valid signature by this key. Off-curve keys and
    /// malformed signatures are just `false`.
    pub fn verify(&self, message: &[u8], signature: &ShadowSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Some(sig) = signature.to_dalek() else {
            return false;
        };
        verifying_key.verify(message, &sig).is_ok()
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.bytes).into_string()
    }

    /// Short form for logs: first 8 base58 chars.
    pub fn short(&self) -> String {
        let full = self.to_base58();
        full.chars().take(8).collect()
    }
}

impl FromStr for ShadowPublicKey {
    type Err = KeyError;

    /// Parse base58. Only the length is checked; program-derived addresses
    /// such as bid vaults are deliberately off-curve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| KeyError::InvalidEncoding)?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidEncoding)?;
        Ok(Self { bytes })
    }
}

impl fmt::Display for ShadowPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for ShadowPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShadowPublicKey({})", self.to_base58())
    }
}

// ---------------------------------------------------------------------------
// ShadowSignature
// ---------------------------------------------------------------------------

impl ShadowSignature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Accepts any slice; length is enforced at verification time.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != 64 {
            return Err(KeyError::InvalidSignatureLength(bytes.len()));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.bytes).into_string()
    }

    fn to_dalek(&self) -> Option<DalekSignature> {
        let arr: [u8; 64] = self.bytes.as_slice().try_into().ok()?;
        Some(DalekSignature::from_bytes(&arr))
    }
}

impl fmt::Display for ShadowSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for ShadowSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b58 = self.to_base58();
        if b58.len() > 16 {
            write!(f, "ShadowSignature({}...)", &b58[..12])
        } else {
            write!(f, "ShadowSignature({})", b58)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_sign_verify_roundtrip() {
        let kp = ShadowKeypair::generate();
        let sig = kp.sign(b"bid 0.05 SOL");
        assert!(kp.verify(b"bid 0.05 SOL", &sig));
        assert!(!kp.verify(b"bid 5 SOL", &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let a = ShadowKeypair::generate();
        let b = ShadowKeypair::generate();
        let sig = a.sign(b"message");
        assert!(!b.public_key().verify(b"message", &sig));
    }

    #[test]
    fn deterministic_from_seed() {
        let seed = [42u8; 32];
        assert_eq!(
            ShadowKeypair::from_seed(&seed).public_key(),
            ShadowKeypair::from_seed(&seed).public_key()
        );
        assert_eq!(*ShadowKeypair::from_seed(&seed).secret_bytes(), seed);
    }

    #[test]
    fn base58_parse_matches_display() {
        let pk = ShadowKeypair::generate().public_key();
        let parsed: ShadowPublicKey = pk.to_string().parse().unwrap();
        assert_eq!(pk, parsed);
        assert!("not-base58-0OIl".parse::<ShadowPublicKey>().is_err());
        assert!("abc".parse::<ShadowPublicKey>().is_err());
    }

    #[test]
    fn try_from_slice_rejects_wrong_length() {
        assert!(ShadowPublicKey::try_from_slice(&[0u8; 16]).is_err());
        let pk = ShadowKeypair::generate().public_key();
        assert_eq!(ShadowPublicKey::try_from_slice(pk.as_bytes()).unwrap(), pk);
    }

    #[test]
    fn truncated_signature_does_not_verify() {
        let kp = ShadowKeypair::generate();
        let sig = kp.sign(b"m");
        let truncated = ShadowSignature {
            bytes: sig.as_bytes()[..63].to_vec(),
        };
        assert!(!kp.verify(b"m", &truncated));
        assert!(ShadowSignature::from_slice(&sig.as_bytes()[..63]).is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = ShadowKeypair::from_seed(&[9u8; 32]);
        let debug_str = format!("{:?}", kp);
        assert!(debug_str.starts_with("ShadowKeypair(pub="));
        assert!(!debug_str.contains(&hex::encode([9u8; 32])));
    }
}
