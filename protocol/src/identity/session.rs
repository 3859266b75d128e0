//! The unlocked session.
//!
//! ```text
//!   Locked ──unlock(wallet, user_id)──▶ Unlocked(MasterIdentity)
//!     ▲                                      │
//!     └──────────── lock() / drop ───────────┘
//! ```
//!
//! While unlocked, the session holds the master signature in zeroizing
//! memory and nothing else. Shadow keypairs are re-derived on every call to
//! [`Session::signing_keypair`] and dropped by the caller when done; there
//! is no keypair cache to leak.

use parking_lot::RwLock;
use std::fmt;
use tracing::info;
use zeroize::{Zeroize, Zeroizing};

use super::derivation::{derive_messaging_keypair, derive_signing_keypair};
use crate::config::MASTER_CHALLENGE_MESSAGE;
use crate::crypto::{sha256, MessagingKeypair, ShadowKeypair, ShadowPublicKey};
use crate::error::{Result, ShadowError};
use crate::wallet::WalletProvider;

/// The root secret material for one wallet and user.
///
/// Not `Serialize`, not `Clone`. `Debug` only prints the wallet address.
pub struct MasterIdentity {
    wallet_address: ShadowPublicKey,
    signature: Zeroizing<Vec<u8>>,
    hashed_user_id: [u8; 32],
}

impl MasterIdentity {
    /// `hashed_user_id = SHA-256(user_id)`.
    pub fn new(wallet_address: ShadowPublicKey, signature: Vec<u8>, user_id: &str) -> Self {
        Self {
            wallet_address,
            signature: Zeroizing::new(signature),
            hashed_user_id: sha256(user_id.as_bytes()),
        }
    }

    pub fn wallet_address(&self) -> ShadowPublicKey {
        self.wallet_address
    }

    pub fn derive_signing(&self, index: u32) -> Result<ShadowKeypair> {
        derive_signing_keypair(&self.signature, &self.hashed_user_id, index)
    }
}

impl Drop for MasterIdentity {
    fn drop(&mut self) {
        self.hashed_user_id.zeroize();
    }
}

impl fmt::Debug for MasterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterIdentity(wallet={}, <redacted>)", self.wallet_address)
    }
}

enum SessionState {
    Locked,
    Unlocked(MasterIdentity),
}

/// Interior-mutable so one session can be shared across tasks by `&`.
pub struct Session {
    state: RwLock<SessionState>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Locked),
        }
    }

    /// Ask `wallet` to sign the master challenge and keep the result.
    ///
    /// Unlocking an already-unlocked session switches to the new wallet and
    /// wipes the previous master identity. A refusal leaves the session as
    /// it was.
    pub async fn unlock(&self, wallet: &dyn WalletProvider, user_id: &str) -> Result<ShadowPublicKey> {
        let address = wallet.public_key();
        let signature = wallet
            .sign_message(MASTER_CHALLENGE_MESSAGE.as_bytes())
            .await?;
        if !address.verify(MASTER_CHALLENGE_MESSAGE.as_bytes(), &signature) {
            return Err(ShadowError::Crypto(
                "wallet returned an invalid master signature".into(),
            ));
        }

        let master = MasterIdentity::new(address, signature.as_bytes().to_vec(), user_id);
        *self.state.write() = SessionState::Unlocked(master);
        info!(wallet = %address, kind = %wallet.kind(), "session unlocked");
        Ok(address)
    }

    /// Drop the master identity. Idempotent.
    pub fn lock(&self) {
        let mut state = self.state.write();
        if matches!(*state, SessionState::Unlocked(_)) {
            info!("session locked");
        }
        *state = SessionState::Locked;
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(*self.state.read(), SessionState::Unlocked(_))
    }

    pub fn wallet_address(&self) -> Result<ShadowPublicKey> {
        match &*self.state.read() {
            SessionState::Unlocked(master) => Ok(master.wallet_address()),
            SessionState::Locked => Err(ShadowError::SessionLocked),
        }
    }

    /// Re-derive shadow identity `index`'s signing key.
    pub fn signing_keypair(&self, index: u32) -> Result<ShadowKeypair> {
        match &*self.state.read() {
            SessionState::Unlocked(master) => master.derive_signing(index),
            SessionState::Locked => Err(ShadowError::SessionLocked),
        }
    }

    /// Re-derive shadow identity `index`'s messaging key.
    pub fn messaging_keypair(&self, index: u32) -> Result<MessagingKeypair> {
        let signing = self.signing_keypair(index)?;
        Ok(derive_messaging_keypair(&signing))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.read() {
            SessionState::Locked => write!(f, "Session(Locked)"),
            SessionState::Unlocked(master) => write!(f, "Session(Unlocked, {:?})", master),
        }
    }
}
