//! The ledger seam.
//!
//! Everything in the core talks to the chain through [`LedgerClient`]. The
//! shipped implementation is [`super::InMemoryLedger`]; an RPC-backed client
//! implements the same six calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::records::{
    registration_key, PostRecord, RecordKey, RecordKind, RegistrationRecord, TargetDescriptor,
};
use super::transaction::{Blockhash, LedgerTransaction, TxSignature};
use crate::crypto::ShadowPublicKey;
use crate::error::{Result, ShadowError};

/// Why the ledger refused (or failed) a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LedgerRejection {
    #[error("insufficient funds in {account}: need {needed}, have {available}")]
    InsufficientFunds {
        account: String,
        needed: u64,
        available: u64,
    },

    #[error("post already exists at {0}")]
    DuplicatePost(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("blockhash not found")]
    BlockhashNotFound,

    #[error("funding tag already used")]
    DuplicateFundingTag,

    #[error("messaging key already registered for {0}")]
    KeyAlreadyRegistered(String),

    #[error("missing or invalid signature for {0}")]
    MissingSignature(String),

    #[error("post has no matching bid payment")]
    MissingBidPayment,

    #[error("bid {0} below minimum")]
    BidBelowMinimum(u64),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("transaction already processed: {0}")]
    AlreadyProcessed(String),

    #[error("instruction {index} failed: {reason}")]
    InstructionFailed { index: usize, reason: String },
}

impl From<LedgerRejection> for ShadowError {
    fn from(rejection: LedgerRejection) -> Self {
        match rejection {
            LedgerRejection::InsufficientFunds {
                needed, available, ..
            } => ShadowError::InsufficientFunds { needed, available },
            LedgerRejection::DuplicatePost(key) => ShadowError::DuplicatePost(key),
            LedgerRejection::InvalidTarget(target) => ShadowError::TargetNotFound(target),
            LedgerRejection::BlockhashNotFound => ShadowError::BlockhashExpired,
            LedgerRejection::DuplicateFundingTag => ShadowError::DuplicateFunding,
            LedgerRejection::KeyAlreadyRegistered(owner) => {
                ShadowError::KeysMismatch { identity: owner }
            }
            LedgerRejection::AlreadyProcessed(sig) => ShadowError::AlreadyProcessed(sig),
            other => ShadowError::LedgerRejected(other.to_string()),
        }
    }
}

/// Where a submitted transaction stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    /// The ledger has never seen this signature.
    Unknown,
    /// Accepted, not yet confirmed.
    Pending,
    /// Executed and committed.
    Confirmed { slot: u64 },
    /// Accepted for processing but failed at execution. Nothing committed.
    Failed(LedgerRejection),
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_balance(&self, account: &ShadowPublicKey) -> Result<u64>;

    async fn latest_blockhash(&self) -> Result<Blockhash>;

    /// Submit a fully signed transaction. Preflight rejections come back as
    /// errors; execution failures after acceptance surface through
    /// [`LedgerClient::confirmation_status`].
    async fn submit_transaction(&self, tx: &LedgerTransaction) -> Result<TxSignature>;

    async fn confirmation_status(&self, signature: &TxSignature) -> Result<ConfirmationStatus>;

    async fn get_record(&self, key: &RecordKey) -> Result<Option<Vec<u8>>>;

    /// All committed records whose first byte is `kind`, in key order.
    async fn records_of_kind(&self, kind: RecordKind) -> Result<Vec<(RecordKey, Vec<u8>)>>;
}

/// Every committed post about `target`, decoded. Undecodable records are
/// skipped with a warning; one bad record shouldn't hide a whole feed.
pub async fn posts_for_target<L: LedgerClient + ?Sized>(
    ledger: &L,
    target: &TargetDescriptor,
) -> Result<Vec<(RecordKey, PostRecord)>> {
    let records = ledger.records_of_kind(RecordKind::Post).await?;
    let mut posts = Vec::new();
    for (key, bytes) in records {
        match PostRecord::decode(&bytes) {
            Ok(post) if post.target == *target => posts.push((key, post)),
            Ok(_) => {}
            Err(e) => tracing::warn!(record = %key, error = %e, "skipping undecodable post record"),
        }
    }
    Ok(posts)
}

/// The messaging-key registration for `owner`, if any.
pub async fn registration_for<L: LedgerClient + ?Sized>(
    ledger: &L,
    owner: &ShadowPublicKey,
) -> Result<Option<RegistrationRecord>> {
    match ledger.get_record(&registration_key(owner)).await? {
        Some(bytes) => Ok(Some(RegistrationRecord::decode(&bytes)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_mapping() {
        assert!(matches!(
            ShadowError::from(LedgerRejection::BlockhashNotFound),
            ShadowError::BlockhashExpired
        ));
        assert!(matches!(
            ShadowError::from(LedgerRejection::DuplicateFundingTag),
            ShadowError::DuplicateFunding
        ));
        assert!(matches!(
            ShadowError::from(LedgerRejection::KeyAlreadyRegistered("abc".into())),
            ShadowError::KeysMismatch { .. }
        ));
        assert!(matches!(
            ShadowError::from(LedgerRejection::InvalidTarget("twitter:@x".into())),
            ShadowError::TargetNotFound(_)
        ));
        assert!(matches!(
            ShadowError::from(LedgerRejection::MissingBidPayment),
            ShadowError::LedgerRejected(_)
        ));
        assert!(matches!(
            ShadowError::from(LedgerRejection::InsufficientFunds {
                account: "a".into(),
                needed: 2,
                available: 1
            }),
            ShadowError::InsufficientFunds {
                needed: 2,
                available: 1
            }
        ));
    }
}
