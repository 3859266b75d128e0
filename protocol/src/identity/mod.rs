//! # Identity
//!
//! Shadow identities, from master secret to list entry:
//!
//! 1. **Session**: the primary wallet signs a fixed challenge once; the
//!    signature lives in zeroizing memory until `lock()`.
//! 2. **Derivation**: `(signature, hashed user id, index)` deterministically
//!    yields an Ed25519 signing key and an X25519 messaging key.
//! 3. **Naming**: a readable `"Adjective Noun"` per public key.
//! 4. **Registry**: the session's identity list, active pointer and
//!    cached balances.
//!
//! Nothing secret is ever persisted. Everything below the session is
//! recomputed on demand.

pub mod derivation;
pub mod naming;
pub mod registry;
pub mod session;

pub use derivation::{derive_messaging_keypair, derive_signing_keypair};
pub use naming::display_name;
pub use registry::{ShadowIdentity, ShadowWalletRegistry};
pub use session::{MasterIdentity, Session};
