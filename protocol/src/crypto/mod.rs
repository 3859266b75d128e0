//! # Cryptographic Primitives
//!
//! Everything that touches key material goes through here:
//!
//! - **Ed25519** for shadow identities, wallets and ledger signatures.
//! - **X25519** for messaging key agreement.
//! - **AES-256-GCM** for message content and identity envelopes.
//! - **SHA-256** for deterministic derivation and record addressing.
//! - **BLAKE3** `derive_key` for turning DH output into AEAD keys.
//!
//! Thin, typed wrappers over audited crates. If you're tempted to get
//! clever in here, don't.

pub mod encryption;
pub mod exchange;
pub mod hash;
pub mod keys;

pub use encryption::{decrypt_with_aad, encrypt_with_aad, EncryptionError};
pub use exchange::{MessagingKeypair, MessagingPublicKey};
pub use hash::{derive_key, sha256, sha256_multi};
pub use keys::{ShadowKeypair, ShadowPublicKey, ShadowSignature};
