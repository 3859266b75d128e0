//! Topping up a shadow identity from the primary wallet.
//!
//! A funding transfer carries an idempotency tag derived from the intent
//! (who is being funded, for which post, at which bid). Two sessions racing
//! to fund the same intent produce the same tag; the ledger accepts the
//! first and rejects the second with `DuplicateFunding`, and the loser just
//! re-checks the balance.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::retry::RetryPolicy;
use crate::crypto::hash::sha256_multi;
use crate::crypto::ShadowPublicKey;
use crate::error::{FundingFailure, Result, ShadowError};
use crate::ledger::{LedgerClient, LedgerTransaction, RecordKey, TransactionBuilder, TxSignature};
use crate::wallet::WalletProvider;

/// `SHA-256("funding" || shadow || post_key || bid_le)`.
pub fn funding_tag(shadow: &ShadowPublicKey, post_key: &RecordKey, bid_lamports: u64) -> [u8; 32] {
    sha256_multi(&[
        b"funding",
        shadow.as_bytes(),
        post_key.as_bytes(),
        &bid_lamports.to_le_bytes(),
    ])
}

/// What one funding transfer is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingIntent {
    pub shadow: ShadowPublicKey,
    pub post_key: RecordKey,
    pub bid_lamports: u64,
    /// Lamports to move: required minus what the identity already holds.
    pub amount: u64,
}

impl FundingIntent {
    pub fn tag(&self) -> [u8; 32] {
        funding_tag(&self.shadow, &self.post_key, self.bid_lamports)
    }
}

/// How a funding submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FundingSubmission {
    Submitted(TxSignature),
    /// Someone else already funded this intent.
    AlreadyFunded,
}

/// Build, have the primary wallet sign, and submit the funding transfer.
///
/// A wallet refusal becomes `FundingFailed { WalletDeclined }`, a ledger
/// refusal `FundingFailed { Rejected }` and a transport error that outlasts
/// the retry budget `FundingFailed { Transport }`.
pub(crate) async fn submit_funding(
    ledger: &dyn LedgerClient,
    retry: &RetryPolicy,
    funder: &dyn WalletProvider,
    intent: &FundingIntent,
) -> Result<FundingSubmission> {
    let payer = funder.public_key();
    let mut expired = 0;
    loop {
        let blockhash = retry
            .run("latest_blockhash", || ledger.latest_blockhash())
            .await
            .map_err(undelivered)?;
        let message = TransactionBuilder::new(payer)
            .recent_blockhash(blockhash)
            .transfer(payer, intent.shadow, intent.amount)
            .idempotency_tag(intent.tag())
            .build()?;
        let mut tx = LedgerTransaction::new(message);

        if let Err(e) = funder.sign_transaction(&mut tx).await {
            return Err(match e {
                ShadowError::WalletRejected(reason) => {
                    info!(reason = %reason, "funding declined in wallet");
                    ShadowError::FundingFailed {
                        reason: FundingFailure::WalletDeclined,
                    }
                }
                other => other,
            });
        }

        let result = retry
            .run("submit_funding", || ledger.submit_transaction(&tx))
            .await;
        match result {
            Ok(signature) => {
                info!(signature = %signature, amount = intent.amount, shadow = %intent.shadow, "funding submitted");
                return Ok(FundingSubmission::Submitted(signature));
            }
            Err(ShadowError::AlreadyProcessed(sig)) => {
                return Ok(FundingSubmission::Submitted(TxSignature(sig)));
            }
            Err(ShadowError::DuplicateFunding) => {
                info!(shadow = %intent.shadow, "intent already funded elsewhere");
                return Ok(FundingSubmission::AlreadyFunded);
            }
            Err(ShadowError::BlockhashExpired) if expired + 1 < retry.max_attempts => {
                expired += 1;
                warn!(attempt = expired, "funding blockhash expired, rebuilding");
            }
            Err(e) if e.is_transient() => return Err(undelivered(e)),
            Err(e) => {
                return Err(ShadowError::FundingFailed {
                    reason: FundingFailure::Rejected(e.to_string()),
                })
            }
        }
    }
}

fn undelivered(e: ShadowError) -> ShadowError {
    if e.is_transient() {
        warn!(error = %e, "funding transfer not delivered");
        ShadowError::FundingFailed {
            reason: FundingFailure::Transport(e.to_string()),
        }
    } else {
        e
    }
}
