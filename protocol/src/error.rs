//! Crate-wide error type.
//!
//! Every fallible operation in shadowpost returns [`ShadowError`]. The
//! variants fall into three buckets that drive retry behavior:
//!
//! - **Local validation** (`InvalidInput`, `BidTooLow`): returned
//!   synchronously, never retried.
//! - **Transient I/O** (`NetworkError`, `TransactionTimeout`): retried a
//!   bounded number of times with backoff by [`crate::composer::RetryPolicy`].
//! - **Semantic rejections** (`InsufficientFunds`, `DuplicatePost`,
//!   `TargetNotFound`, `KeysMismatch`, `RecipientNotRegistered`): surfaced
//!   unmodified. Retrying would not change the outcome.
//!
//! Wallet-side failures (`FundingFailed { reason: WalletDeclined }`,
//! `WalletRejected`) are kept apart from ledger rejections so a caller can
//! decide between re-prompting for a signature and abandoning the flow.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ShadowError>;

/// Why a funding attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingFailure {
    /// The user declined the transfer prompt in their primary wallet.
    WalletDeclined,
    /// The ledger rejected the funding transfer.
    Rejected(String),
    /// The transfer never reached the ledger within the retry budget.
    Transport(String),
    /// The transfer confirmed but the identity is still short of the
    /// required balance.
    StillShort {
        /// Lamports required for the post.
        required: u64,
        /// Lamports actually available after funding.
        available: u64,
    },
}

impl fmt::Display for FundingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundingFailure::WalletDeclined => write!(f, "wallet declined the transfer"),
            FundingFailure::Rejected(reason) => write!(f, "ledger rejected transfer: {}", reason),
            FundingFailure::Transport(reason) => write!(f, "transfer not delivered: {}", reason),
            FundingFailure::StillShort {
                required,
                available,
            } => write!(f, "still short after funding: need {}, have {}", required, available),
        }
    }
}

/// Errors that can occur anywhere in the shadowpost core.
#[derive(Debug, Error)]
pub enum ShadowError {
    /// Malformed input to a pure function (derivation input, content, handle).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The bid is below the protocol minimum.
    #[error("bid too low: {bid} lamports (minimum {minimum})")]
    BidTooLow {
        /// The offered bid.
        bid: u64,
        /// The protocol minimum.
        minimum: u64,
    },

    /// An account lacks the lamports an operation needs.
    #[error("insufficient funds: need {needed} lamports, have {available}")]
    InsufficientFunds {
        /// Lamports required.
        needed: u64,
        /// Lamports available.
        available: u64,
    },

    /// Funding the shadow identity from the primary wallet failed.
    #[error("funding failed: {reason}")]
    FundingFailed {
        /// What went wrong.
        reason: FundingFailure,
    },

    /// The author already has a post against this target.
    #[error("duplicate post: {0}")]
    DuplicatePost(String),

    /// The target does not exist or is not a valid target.
    #[error("target not found: {0}")]
    TargetNotFound(String),

    /// A different messaging key is already registered for this identity.
    #[error("messaging keys mismatch for {identity}: explicit re-sync required")]
    KeysMismatch {
        /// The identity whose registration conflicts.
        identity: String,
    },

    /// The recipient has no messaging key on file.
    #[error("recipient not registered: {0}")]
    RecipientNotRegistered(String),

    /// A transaction did not confirm within the allowed window.
    #[error("transaction {signature} not confirmed after {elapsed_ms}ms")]
    TransactionTimeout {
        /// Signature of the unconfirmed transaction.
        signature: String,
        /// Milliseconds waited.
        elapsed_ms: u64,
    },

    /// Transport-level failure talking to the ledger or social backend.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The wallet refused to sign (other than a funding transfer).
    #[error("wallet rejected request: {0}")]
    WalletRejected(String),

    /// The session is locked; no master secret is available.
    #[error("session is locked")]
    SessionLocked,

    /// No identity with this index is in the session list.
    #[error("unknown identity index {0}")]
    UnknownIdentity(u32),

    /// The exact signed payload was already processed by the ledger.
    #[error("transaction already processed: {0}")]
    AlreadyProcessed(String),

    /// The transaction references a blockhash the ledger no longer accepts.
    #[error("blockhash expired")]
    BlockhashExpired,

    /// A funding transfer carrying the same idempotency tag already landed.
    #[error("funding already submitted for this intent")]
    DuplicateFunding,

    /// Any other ledger-level rejection.
    #[error("ledger rejected transaction: {0}")]
    LedgerRejected(String),

    /// A cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration failed to load or validate.
    #[error("config error: {0}")]
    Config(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl ShadowError {
    /// Transient errors are retried with backoff at component boundaries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ShadowError::NetworkError(_) | ShadowError::TransactionTimeout { .. }
        )
    }

    /// Failures caused by the wallet rather than the ledger. The caller may
    /// re-prompt for a signature instead of abandoning the flow.
    pub fn is_wallet_side(&self) -> bool {
        matches!(
            self,
            ShadowError::WalletRejected(_)
                | ShadowError::FundingFailed {
                    reason: FundingFailure::WalletDeclined
                }
        )
    }

    /// Semantic ledger rejections. Never retried.
    pub fn is_ledger_rejection(&self) -> bool {
        matches!(
            self,
            ShadowError::InsufficientFunds { .. }
                | ShadowError::DuplicatePost(_)
                | ShadowError::TargetNotFound(_)
                | ShadowError::KeysMismatch { .. }
                | ShadowError::RecipientNotRegistered(_)
                | ShadowError::DuplicateFunding
                | ShadowError::LedgerRejected(_)
        )
    }
}
