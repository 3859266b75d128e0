//! Wallet provider seam and capability probing.
//!
//! Browser wallets announce themselves through wallet-standard descriptors:
//! a name plus a set of feature strings. We only care whether a wallet can
//! sign messages (to unlock a session) and sign transactions (to fund
//! shadow identities), and pick among the capable ones by preference.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::crypto::{ShadowPublicKey, ShadowSignature};
use crate::error::{Result, ShadowError};
use crate::ledger::LedgerTransaction;

pub const FEATURE_SIGN_TRANSACTION: &str = "solana:signTransaction";
pub const FEATURE_SIGN_MESSAGE: &str = "solana:signMessage";

const REQUIRED_FEATURES: [&str; 2] = [FEATURE_SIGN_TRANSACTION, FEATURE_SIGN_MESSAGE];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletKind {
    Phantom,
    Solflare,
    Backpack,
    Other(String),
}

impl WalletKind {
    /// Case-insensitive match on the announced wallet name.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "phantom" => Self::Phantom,
            "solflare" => Self::Solflare,
            "backpack" => Self::Backpack,
            _ => Self::Other(name.trim().to_string()),
        }
    }

    /// Lower is preferred when nothing is requested explicitly.
    fn priority(&self) -> u8 {
        match self {
            Self::Phantom => 0,
            Self::Solflare => 1,
            Self::Backpack => 2,
            Self::Other(_) => 3,
        }
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phantom => write!(f, "Phantom"),
            Self::Solflare => write!(f, "Solflare"),
            Self::Backpack => write!(f, "Backpack"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

/// What a wallet announced about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDescriptor {
    pub name: String,
    pub features: BTreeSet<String>,
}

impl WalletDescriptor {
    pub fn new<I, S>(name: &str, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            features: features.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kind(&self) -> WalletKind {
        WalletKind::from_name(&self.name)
    }

    pub fn is_capable(&self) -> bool {
        REQUIRED_FEATURES.iter().all(|f| self.features.contains(*f))
    }
}

/// Pick the wallet to use. An explicit `preferred` kind wins if it is
/// present and capable; otherwise the highest-priority capable wallet.
pub fn select_provider<'a>(
    descriptors: &'a [WalletDescriptor],
    preferred: Option<&WalletKind>,
) -> Result<&'a WalletDescriptor> {
    let capable: Vec<&WalletDescriptor> = descriptors.iter().filter(|d| d.is_capable()).collect();

    if let Some(want) = preferred {
        if let Some(found) = capable.iter().find(|d| d.kind() == *want) {
            return Ok(*found);
        }
        tracing::debug!(wallet = %want, "preferred wallet unavailable or incapable");
    }

    capable
        .into_iter()
        .min_by_key(|d| d.kind().priority())
        .ok_or_else(|| {
            ShadowError::WalletRejected(format!(
                "no wallet supports {}",
                REQUIRED_FEATURES.join(" + ")
            ))
        })
}

/// A connected wallet holding the user's primary key.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn kind(&self) -> WalletKind;

    fn public_key(&self) -> ShadowPublicKey;

    /// Sign an arbitrary message. A user refusal is `WalletRejected`.
    async fn sign_message(&self, message: &[u8]) -> Result<ShadowSignature>;

    /// Add the wallet's signature to `tx`. A user refusal is `WalletRejected`.
    async fn sign_transaction(&self, tx: &mut LedgerTransaction) -> Result<()>;
}
