//! Ledger transactions: construction, signing and wire encoding.
//!
//! A [`TransactionMessage`] is the unsigned body: fee payer, recent
//! blockhash and an ordered list of [`Instruction`]s. The ledger executes
//! the instructions in order and commits all of them or none.
//!
//! Signing covers [`TransactionMessage::signable_bytes`], a hand-written
//! canonical layout. Wire transport uses bincode over the whole signed
//! [`LedgerTransaction`]; the signature never depends on bincode's layout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::records::{MessageRecord, TargetDescriptor};
use crate::config::{MAX_CONTENT_LENGTH, NETWORK_FEE_LAMPORTS_PER_SIGNATURE};
use crate::crypto::{MessagingPublicKey, ShadowKeypair, ShadowPublicKey, ShadowSignature};
use crate::error::{Result, ShadowError};

/// Canonical encoding version prefix.
const SIGNABLE_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Blockhash & TxSignature
// ---------------------------------------------------------------------------

/// A recent blockhash. Transactions referencing one that has aged out of
/// the ledger's window are rejected, which bounds how long a signed
/// payload can be replayed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blockhash(pub [u8; 32]);

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blockhash({})", self)
    }
}

/// Transaction identifier: the base58 fee-payer signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxSignature(pub String);

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Instruction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Move lamports. `from` must sign.
    Transfer {
        from: ShadowPublicKey,
        to: ShadowPublicKey,
        lamports: u64,
    },
    /// Create a post record. `author` must sign, and the same transaction
    /// must carry a `Transfer` of exactly `bid_lamports` from the author to
    /// the target's bid vault.
    CreatePost {
        author: ShadowPublicKey,
        target: TargetDescriptor,
        content: String,
        bid_lamports: u64,
    },
    /// Register (or with `overwrite`, replace) a messaging key. `owner`
    /// must sign.
    RegisterMessagingKey {
        owner: ShadowPublicKey,
        messaging_key: MessagingPublicKey,
        overwrite: bool,
    },
    /// Store an encrypted message. Only the fee payer signs.
    StoreMessage { record: MessageRecord },
    /// Ledger-enforced uniqueness tag. A second transaction carrying a tag
    /// the ledger has already seen is rejected.
    IdempotencyTag { tag: [u8; 32] },
}

impl Instruction {
    fn signer(&self) -> Option<ShadowPublicKey> {
        match self {
            Instruction::Transfer { from, .. } => Some(*from),
            Instruction::CreatePost { author, .. } => Some(*author),
            Instruction::RegisterMessagingKey { owner, .. } => Some(*owner),
            Instruction::StoreMessage { .. } | Instruction::IdempotencyTag { .. } => None,
        }
    }

    fn write_signable(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Instruction::Transfer { from, to, lamports } => {
                buf.push(0x01);
                buf.extend_from_slice(from.as_bytes());
                buf.extend_from_slice(to.as_bytes());
                buf.extend_from_slice(&lamports.to_le_bytes());
            }
            Instruction::CreatePost {
                author,
                target,
                content,
                bid_lamports,
            } => {
                if content.len() > MAX_CONTENT_LENGTH {
                    return Err(ShadowError::InvalidInput(format!(
                        "content is {} bytes (max {})",
                        content.len(),
                        MAX_CONTENT_LENGTH
                    )));
                }
                buf.push(0x02);
                buf.extend_from_slice(author.as_bytes());
                buf.extend_from_slice(&target.to_bytes());
                buf.extend_from_slice(&(content.len() as u16).to_le_bytes());
                buf.extend_from_slice(content.as_bytes());
                buf.extend_from_slice(&bid_lamports.to_le_bytes());
            }
            Instruction::RegisterMessagingKey {
                owner,
                messaging_key,
                overwrite,
            } => {
                buf.push(0x03);
                buf.extend_from_slice(owner.as_bytes());
                buf.extend_from_slice(messaging_key.as_bytes());
                buf.push(u8::from(*overwrite));
            }
            Instruction::StoreMessage { record } => {
                buf.push(0x04);
                let encoded = record.encode()?;
                buf.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
                buf.extend_from_slice(&encoded);
            }
            Instruction::IdempotencyTag { tag } => {
                buf.push(0x05);
                buf.extend_from_slice(tag);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TransactionMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMessage {
    pub fee_payer: ShadowPublicKey,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<Instruction>,
}

impl TransactionMessage {
    /// Canonical bytes covered by every signature.
    ///
    /// `version u8 | fee_payer[32] | blockhash[32] | count u16 | instr...`,
    /// each instruction tagged and fixed-order.
    pub fn signable_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(128 + self.instructions.len() * 80);
        buf.push(SIGNABLE_VERSION);
        buf.extend_from_slice(self.fee_payer.as_bytes());
        buf.extend_from_slice(&self.recent_blockhash.0);
        let count = u16::try_from(self.instructions.len())
            .map_err(|_| ShadowError::InvalidInput("too many instructions".into()))?;
        buf.extend_from_slice(&count.to_le_bytes());
        for ix in &self.instructions {
            ix.write_signable(&mut buf)?;
        }
        Ok(buf)
    }

    /// Fee payer first, then every other instruction signer, deduplicated.
    pub fn required_signers(&self) -> Vec<ShadowPublicKey> {
        let mut seen = BTreeSet::new();
        seen.insert(self.fee_payer);
        let mut signers = vec![self.fee_payer];
        for signer in self.instructions.iter().filter_map(Instruction::signer) {
            if seen.insert(signer) {
                signers.push(signer);
            }
        }
        signers
    }

    /// Network fee the fee payer is charged.
    pub fn network_fee(&self) -> u64 {
        self.required_signers().len() as u64 * NETWORK_FEE_LAMPORTS_PER_SIGNATURE
    }
}

// ---------------------------------------------------------------------------
// LedgerTransaction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub signer: ShadowPublicKey,
    pub signature: ShadowSignature,
}

/// A (partially) signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub message: TransactionMessage,
    pub signatures: Vec<SignatureEntry>,
}

impl LedgerTransaction {
    pub fn new(message: TransactionMessage) -> Self {
        Self {
            message,
            signatures: Vec::new(),
        }
    }

    /// Add (or replace) `keypair`'s signature. Signing with a key that is
    /// not a required signer is refused.
    pub fn sign(&mut self, keypair: &ShadowKeypair) -> Result<()> {
        let signer = keypair.public_key();
        if !self.message.required_signers().contains(&signer) {
            return Err(ShadowError::InvalidInput(format!(
                "{} is not a signer of this transaction",
                signer
            )));
        }
        let signature = keypair.sign(&self.message.signable_bytes()?);
        self.signatures.retain(|entry| entry.signer != signer);
        self.signatures.push(SignatureEntry { signer, signature });
        Ok(())
    }

    /// Attach an externally produced signature (e.g. from a wallet).
    pub fn add_signature(&mut self, signer: ShadowPublicKey, signature: ShadowSignature) {
        self.signatures.retain(|entry| entry.signer != signer);
        self.signatures.push(SignatureEntry { signer, signature });
    }

    /// The fee payer's signature, once present.
    pub fn signature(&self) -> Option<TxSignature> {
        self.signatures
            .iter()
            .find(|entry| entry.signer == self.message.fee_payer)
            .map(|entry| TxSignature(entry.signature.to_base58()))
    }

    /// Every required signer has a valid signature over the signable bytes.
    pub fn verify_signatures(&self) -> bool {
        let Ok(bytes) = self.message.signable_bytes() else {
            return false;
        };
        self.message.required_signers().iter().all(|signer| {
            self.signatures
                .iter()
                .any(|entry| entry.signer == *signer && signer.verify(&bytes, &entry.signature))
        })
    }

    pub fn to_wire(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ShadowError::Serialization(e.to_string()))
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| ShadowError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`TransactionMessage`].
///
/// ```rust,no_run
/// use shadowpost_protocol::ledger::{Blockhash, TransactionBuilder};
/// use shadowpost_protocol::crypto::ShadowKeypair;
///
/// let payer = ShadowKeypair::generate().public_key();
/// let to = ShadowKeypair::generate().public_key();
/// let message = TransactionBuilder::new(payer)
///     .recent_blockhash(Blockhash([0; 32]))
///     .transfer(payer, to, 1_000)
///     .build()
///     .unwrap();
/// ```
pub struct TransactionBuilder {
    fee_payer: ShadowPublicKey,
    recent_blockhash: Option<Blockhash>,
    instructions: Vec<Instruction>,
}

impl TransactionBuilder {
    pub fn new(fee_payer: ShadowPublicKey) -> Self {
        Self {
            fee_payer,
            recent_blockhash: None,
            instructions: Vec::new(),
        }
    }

    pub fn recent_blockhash(mut self, blockhash: Blockhash) -> Self {
        self.recent_blockhash = Some(blockhash);
        self
    }

    pub fn transfer(self, from: ShadowPublicKey, to: ShadowPublicKey, lamports: u64) -> Self {
        self.instruction(Instruction::Transfer { from, to, lamports })
    }

    pub fn create_post(
        self,
        author: ShadowPublicKey,
        target: TargetDescriptor,
        content: impl Into<String>,
        bid_lamports: u64,
    ) -> Self {
        self.instruction(Instruction::CreatePost {
            author,
            target,
            content: content.into(),
            bid_lamports,
        })
    }

    pub fn register_messaging_key(
        self,
        owner: ShadowPublicKey,
        messaging_key: MessagingPublicKey,
        overwrite: bool,
    ) -> Self {
        self.instruction(Instruction::RegisterMessagingKey {
            owner,
            messaging_key,
            overwrite,
        })
    }

    pub fn store_message(self, record: MessageRecord) -> Self {
        self.instruction(Instruction::StoreMessage { record })
    }

    pub fn idempotency_tag(self, tag: [u8; 32]) -> Self {
        self.instruction(Instruction::IdempotencyTag { tag })
    }

    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Fails without a blockhash or with no instructions.
    pub fn build(self) -> Result<TransactionMessage> {
        let recent_blockhash = self
            .recent_blockhash
            .ok_or_else(|| ShadowError::InvalidInput("missing recent blockhash".into()))?;
        if self.instructions.is_empty() {
            return Err(ShadowError::InvalidInput("transaction has no instructions".into()));
        }
        let message = TransactionMessage {
            fee_payer: self.fee_payer,
            recent_blockhash,
            instructions: self.instructions,
        };
        // Surface encoding problems at build time rather than at signing.
        message.signable_bytes()?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::records::Platform;

    fn transfer_message(payer: &ShadowKeypair) -> TransactionMessage {
        TransactionBuilder::new(payer.public_key())
            .recent_blockhash(Blockhash([1; 32]))
            .transfer(
                payer.public_key(),
                ShadowPublicKey::from_bytes([2; 32]),
                500,
            )
            .build()
            .unwrap()
    }

    #[test]
    fn build_requires_blockhash_and_instructions() {
        let payer = ShadowKeypair::generate().public_key();
        assert!(TransactionBuilder::new(payer)
            .transfer(payer, payer, 1)
            .build()
            .is_err());
        assert!(TransactionBuilder::new(payer)
            .recent_blockhash(Blockhash([0; 32]))
            .build()
            .is_err());
    }

    #[test]
    fn signed_transaction_verifies() {
        let payer = ShadowKeypair::generate();
        let mut tx = LedgerTransaction::new(transfer_message(&payer));
        assert!(!tx.verify_signatures());
        tx.sign(&payer).unwrap();
        assert!(tx.verify_signatures());
        assert!(tx.signature().is_some());
    }

    #[test]
    fn tampering_breaks_signature() {
        let payer = ShadowKeypair::generate();
        let mut tx = LedgerTransaction::new(transfer_message(&payer));
        tx.sign(&payer).unwrap();
        if let Instruction::Transfer { lamports, .. } = &mut tx.message.instructions[0] {
            *lamports = 5_000_000;
        }
        assert!(!tx.verify_signatures());
    }

    #[test]
    fn foreign_signer_refused() {
        let payer = ShadowKeypair::generate();
        let stranger = ShadowKeypair::generate();
        let mut tx = LedgerTransaction::new(transfer_message(&payer));
        assert!(tx.sign(&stranger).is_err());
    }

    #[test]
    fn required_signers_dedup_with_fee_payer_first() {
        let payer = ShadowKeypair::generate().public_key();
        let funder = ShadowKeypair::generate().public_key();
        let target = TargetDescriptor::new(Platform::Twitter, "alice").unwrap();
        let msg = TransactionBuilder::new(payer)
            .recent_blockhash(Blockhash([0; 32]))
            .create_post(payer, target, "hello", 1_000_000)
            .transfer(funder, payer, 10)
            .transfer(payer, funder, 1)
            .idempotency_tag([9; 32])
            .build()
            .unwrap();
        assert_eq!(msg.required_signers(), vec![payer, funder]);
        assert_eq!(msg.network_fee(), 2 * NETWORK_FEE_LAMPORTS_PER_SIGNATURE);
    }

    #[test]
    fn wire_encoding_preserves_signatures() {
        let payer = ShadowKeypair::generate();
        let mut tx = LedgerTransaction::new(transfer_message(&payer));
        tx.sign(&payer).unwrap();
        let decoded = LedgerTransaction::from_wire(&tx.to_wire().unwrap()).unwrap();
        assert_eq!(decoded, tx);
        assert!(decoded.verify_signatures());
    }

    #[test]
    fn oversized_post_content_fails_build() {
        let payer = ShadowKeypair::generate().public_key();
        let target = TargetDescriptor::new(Platform::Twitter, "alice").unwrap();
        let result = TransactionBuilder::new(payer)
            .recent_blockhash(Blockhash([0; 32]))
            .create_post(payer, target, "x".repeat(MAX_CONTENT_LENGTH + 1), 1_000_000)
            .build();
        assert!(matches!(result, Err(ShadowError::InvalidInput(_))));
    }
}
