//! # X25519 Key Agreement
//!
//! Messaging keys for direct messages. Each shadow identity has one static
//! X25519 keypair, derived from its signing key, whose public half is
//! registered on the ledger so others can write to it.
//!
//! The raw DH output is never used as a key. Callers run it through
//! [`crate::crypto::hash::derive_key`] with a context string first.
//!
//! Low-order peer keys produce an all-zero shared secret. We check
//! `was_contributory()` and refuse those, otherwise anyone registering a
//! degenerate key could read every message sent to them by anyone.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::ShadowError;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("key exchange produced a non-contributory shared secret")]
    NonContributory,
}

impl From<ExchangeError> for ShadowError {
    fn from(e: ExchangeError) -> Self {
        ShadowError::Crypto(e.to_string())
    }
}

/// Public half of a messaging keypair. This is what goes on the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessagingPublicKey([u8; 32]);

impl MessagingPublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Debug for MessagingPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessagingPublicKey({})", self.to_base58())
    }
}

impl fmt::Display for MessagingPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// A static X25519 keypair. The secret is zeroized on drop by x25519-dalek.
pub struct MessagingKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl MessagingKeypair {
    /// Deterministic keypair from a 32-byte seed. X25519 clamps the scalar
    /// internally, so any 32 bytes are fine.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> MessagingPublicKey {
        MessagingPublicKey(self.public.to_bytes())
    }

    /// Raw DH with a peer. Rejects low-order peer keys.
    pub fn diffie_hellman(
        &self,
        peer: &MessagingPublicKey,
    ) -> Result<Zeroizing<[u8; 32]>, ExchangeError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer.0));
        if !shared.was_contributory() {
            return Err(ExchangeError::NonContributory);
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

impl fmt::Debug for MessagingKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessagingKeypair(pub={})", self.public_key())
    }
}

/// One-shot DH against `peer` with a fresh ephemeral key. Returns the
/// ephemeral public key and the shared secret. The ephemeral secret is
/// consumed and cannot be reused.
pub fn ephemeral_agreement(
    peer: &MessagingPublicKey,
) -> Result<(MessagingPublicKey, Zeroizing<[u8; 32]>), ExchangeError> {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    let shared = secret.diffie_hellman(&PublicKey::from(peer.0));
    if !shared.was_contributory() {
        return Err(ExchangeError::NonContributory);
    }
    Ok((
        MessagingPublicKey(public.to_bytes()),
        Zeroizing::new(shared.to_bytes()),
    ))
}
