//! A wallet backed by a keypair in memory.
//!
//! Stands in for a browser wallet in tests and the CLI simulator. It can
//! be told to decline (the user pressing "Reject") and it keeps a log of
//! what it was asked to sign, so tests can assert on requested amounts.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::provider::{WalletKind, WalletProvider};
use crate::crypto::{ShadowKeypair, ShadowPublicKey, ShadowSignature};
use crate::error::{Result, ShadowError};
use crate::ledger::{Instruction, LedgerTransaction};

/// One entry in the wallet's request log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignRequest {
    Message { len: usize },
    /// `outgoing_lamports` sums transfers debiting this wallet.
    Transaction { outgoing_lamports: u64 },
}

pub struct LocalKeypairWallet {
    kind: WalletKind,
    keypair: ShadowKeypair,
    decline: AtomicBool,
    requests: Mutex<Vec<SignRequest>>,
}

impl LocalKeypairWallet {
    pub fn new(kind: WalletKind, keypair: ShadowKeypair) -> Self {
        Self {
            kind,
            keypair,
            decline: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn generate() -> Self {
        Self::new(WalletKind::Phantom, ShadowKeypair::generate())
    }

    /// While set, every request is refused.
    pub fn set_decline(&self, decline: bool) {
        self.decline.store(decline, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<SignRequest> {
        self.requests.lock().clone()
    }

    fn check_consent(&self) -> Result<()> {
        if self.decline.load(Ordering::SeqCst) {
            return Err(ShadowError::WalletRejected("user declined the request".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WalletProvider for LocalKeypairWallet {
    fn kind(&self) -> WalletKind {
        self.kind.clone()
    }

    fn public_key(&self) -> ShadowPublicKey {
        self.keypair.public_key()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<ShadowSignature> {
        self.requests
            .lock()
            .push(SignRequest::Message { len: message.len() });
        self.check_consent()?;
        Ok(self.keypair.sign(message))
    }

    async fn sign_transaction(&self, tx: &mut LedgerTransaction) -> Result<()> {
        let me = self.keypair.public_key();
        let outgoing_lamports = tx
            .message
            .instructions
            .iter()
            .filter_map(|ix| match ix {
                Instruction::Transfer { from, lamports, .. } if *from == me => Some(*lamports),
                _ => None,
            })
            .sum();
        self.requests
            .lock()
            .push(SignRequest::Transaction { outgoing_lamports });
        self.check_consent()?;
        tx.sign(&self.keypair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Blockhash, TransactionBuilder};

    #[tokio::test]
    async fn signs_and_logs() {
        let wallet = LocalKeypairWallet::generate();
        let sig = wallet.sign_message(b"unlock").await.unwrap();
        assert!(wallet.public_key().verify(b"unlock", &sig));

        let to = ShadowKeypair::generate().public_key();
        let message = TransactionBuilder::new(wallet.public_key())
            .recent_blockhash(Blockhash([0; 32]))
            .transfer(wallet.public_key(), to, 42)
            .build()
            .unwrap();
        let mut tx = LedgerTransaction::new(message);
        wallet.sign_transaction(&mut tx).await.unwrap();
        assert!(tx.verify_signatures());
        assert_eq!(
            wallet.requests(),
            vec![
                SignRequest::Message { len: 6 },
                SignRequest::Transaction {
                    outgoing_lamports: 42
                }
            ]
        );
    }

    #[tokio::test]
    async fn declining_is_wallet_side() {
        let wallet = LocalKeypairWallet::generate();
        wallet.set_decline(true);
        let err = wallet.sign_message(b"unlock").await.unwrap_err();
        assert!(err.is_wallet_side());
        assert_eq!(wallet.requests().len(), 1);
    }
}
