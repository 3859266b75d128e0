//! In-process ledger.
//!
//! A faithful-enough stand-in for the real chain: signature checks, a
//! recent-blockhash window, replay detection, per-signature network fees
//! and all-or-nothing execution. Used by the tests, the benches and the
//! CLI simulator.
//!
//! Execution runs against a clone of the chain state and only swaps it in
//! when every instruction succeeded, so a failure at instruction N leaves
//! no trace of instructions 0..N. A failed transaction still takes up a
//! slot, so a retry after it sees a fresh blockhash.
//!
//! The test controls (`hold_confirmations`, `fail_next_submits`,
//! `fail_instruction`, ...) exist to drive the composer down its
//! unhappy paths deterministically.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

use super::client::{ConfirmationStatus, LedgerClient, LedgerRejection};
use super::records::{
    bid_vault_address, post_key, registration_key, PostRecord, RecordKey, RecordKind,
    RegistrationRecord, TargetDescriptor,
};
use super::transaction::{Blockhash, Instruction, LedgerTransaction, TxSignature};
use crate::config::{BLOCKHASH_VALIDITY_SLOTS, MAX_CONTENT_LENGTH, MIN_BID_LAMPORTS};
use crate::crypto::hash::sha256_multi;
use crate::crypto::ShadowPublicKey;
use crate::error::{Result, ShadowError};

fn blockhash_for_slot(slot: u64) -> Blockhash {
    Blockhash(sha256_multi(&[b"blockhash", &slot.to_le_bytes()]))
}

/// The part of the state a transaction can touch. Cloned per execution.
#[derive(Debug, Clone, Default)]
struct ChainState {
    balances: HashMap<ShadowPublicKey, u64>,
    records: BTreeMap<RecordKey, Vec<u8>>,
    funding_tags: HashSet<[u8; 32]>,
}

impl ChainState {
    fn debit(&mut self, account: &ShadowPublicKey, lamports: u64) -> std::result::Result<(), LedgerRejection> {
        let balance = self.balances.get(account).copied().unwrap_or(0);
        if balance < lamports {
            return Err(LedgerRejection::InsufficientFunds {
                account: account.to_string(),
                needed: lamports,
                available: balance,
            });
        }
        self.balances.insert(*account, balance - lamports);
        Ok(())
    }

    fn credit(&mut self, account: &ShadowPublicKey, lamports: u64) {
        let entry = self.balances.entry(*account).or_insert(0);
        *entry = entry.saturating_add(lamports);
    }
}

#[derive(Debug)]
struct Inner {
    chain: ChainState,
    slot: u64,
    unix_timestamp: i64,
    recent_blockhashes: VecDeque<Blockhash>,
    statuses: HashMap<TxSignature, ConfirmationStatus>,
    hold_confirmations: bool,
    held: Vec<(TxSignature, LedgerTransaction)>,
    fail_next_submits: u32,
    fail_next_reads: u32,
    fail_instruction: Option<usize>,
    submissions: u64,
}

impl Inner {
    fn advance_slot(&mut self) {
        self.slot += 1;
        self.recent_blockhashes.push_back(blockhash_for_slot(self.slot));
        while self.recent_blockhashes.len() > BLOCKHASH_VALIDITY_SLOTS {
            self.recent_blockhashes.pop_front();
        }
    }

    /// Executed transactions occupy a slot whether or not they commit.
    fn execute(&mut self, tx: &LedgerTransaction) -> std::result::Result<u64, LedgerRejection> {
        let result = self.apply(tx);
        let slot = self.slot;
        self.advance_slot();
        result.map(|()| slot)
    }

    /// Run every instruction against a working copy; commit only on full
    /// success.
    fn apply(&mut self, tx: &LedgerTransaction) -> std::result::Result<(), LedgerRejection> {
        let mut work = self.chain.clone();
        let message = &tx.message;

        work.debit(&message.fee_payer, message.network_fee())?;

        for (index, ix) in message.instructions.iter().enumerate() {
            if self.fail_instruction == Some(index) {
                self.fail_instruction = None;
                return Err(LedgerRejection::InstructionFailed {
                    index,
                    reason: "injected fault".into(),
                });
            }
            match ix {
                Instruction::Transfer { from, to, lamports } => {
                    work.debit(from, *lamports)?;
                    work.credit(to, *lamports);
                }
                Instruction::CreatePost {
                    author,
                    target,
                    content,
                    bid_lamports,
                } => {
                    self.apply_create_post(&mut work, tx, author, target, content, *bid_lamports)?;
                }
                Instruction::RegisterMessagingKey {
                    owner,
                    messaging_key,
                    overwrite,
                } => {
                    let key = registration_key(owner);
                    if let Some(existing) = work.records.get(&key) {
                        let existing = RegistrationRecord::decode(existing)
                            .map_err(|e| LedgerRejection::InvalidRecord(e.to_string()))?;
                        if existing.messaging_key == *messaging_key {
                            continue;
                        }
                        if !*overwrite {
                            return Err(LedgerRejection::KeyAlreadyRegistered(owner.to_string()));
                        }
                    }
                    let record = RegistrationRecord {
                        owner: *owner,
                        messaging_key: *messaging_key,
                        registered_at: self.unix_timestamp,
                    };
                    work.records.insert(key, record.encode());
                }
                Instruction::StoreMessage { record } => {
                    let mut record = record.clone();
                    record.timestamp = self.unix_timestamp;
                    let key = record.key();
                    if work.records.contains_key(&key) {
                        return Err(LedgerRejection::InvalidRecord(format!(
                            "message {} already stored",
                            key
                        )));
                    }
                    let bytes = record
                        .encode()
                        .map_err(|e| LedgerRejection::InvalidRecord(e.to_string()))?;
                    work.records.insert(key, bytes);
                }
                Instruction::IdempotencyTag { tag } => {
                    if !work.funding_tags.insert(*tag) {
                        return Err(LedgerRejection::DuplicateFundingTag);
                    }
                }
            }
        }

        self.chain = work;
        Ok(())
    }

    fn apply_create_post(
        &self,
        work: &mut ChainState,
        tx: &LedgerTransaction,
        author: &ShadowPublicKey,
        target: &TargetDescriptor,
        content: &str,
        bid_lamports: u64,
    ) -> std::result::Result<(), LedgerRejection> {
        if bid_lamports < MIN_BID_LAMPORTS {
            return Err(LedgerRejection::BidBelowMinimum(bid_lamports));
        }
        if content.is_empty() || content.len() > MAX_CONTENT_LENGTH {
            return Err(LedgerRejection::InvalidRecord(format!(
                "content length {} out of range",
                content.len()
            )));
        }
        // Deserialized descriptors skip normalization; re-check.
        match TargetDescriptor::new(target.platform(), target.handle()) {
            Ok(normalized) if normalized == *target => {}
            _ => return Err(LedgerRejection::InvalidTarget(target.to_string())),
        }

        let vault = bid_vault_address(target);
        let paid = tx.message.instructions.iter().any(|ix| {
            matches!(ix, Instruction::Transfer { from, to, lamports }
                if from == author && *to == vault && *lamports == bid_lamports)
        });
        if !paid {
            return Err(LedgerRejection::MissingBidPayment);
        }

        let key = post_key(author, target);
        if work.records.contains_key(&key) {
            return Err(LedgerRejection::DuplicatePost(key.to_string()));
        }
        let record = PostRecord {
            author: *author,
            target: target.clone(),
            content: content.to_string(),
            bid_lamports,
            timestamp: self.unix_timestamp,
        };
        let bytes = record
            .encode()
            .map_err(|e| LedgerRejection::InvalidRecord(e.to_string()))?;
        work.records.insert(key, bytes);
        Ok(())
    }
}

/// See the module docs.
#[derive(Debug)]
pub struct InMemoryLedger {
    inner: RwLock<Inner>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        let mut recent_blockhashes = VecDeque::with_capacity(BLOCKHASH_VALIDITY_SLOTS);
        recent_blockhashes.push_back(blockhash_for_slot(0));
        Self {
            inner: RwLock::new(Inner {
                chain: ChainState::default(),
                slot: 0,
                unix_timestamp: chrono::Utc::now().timestamp(),
                recent_blockhashes,
                statuses: HashMap::new(),
                hold_confirmations: false,
                held: Vec::new(),
                fail_next_submits: 0,
                fail_next_reads: 0,
                fail_instruction: None,
                submissions: 0,
            }),
        }
    }

    // -- test controls ------------------------------------------------------

    pub fn airdrop(&self, account: &ShadowPublicKey, lamports: u64) {
        self.inner.write().chain.credit(account, lamports);
    }

    /// Synchronous balance peek.
    pub fn balance_of(&self, account: &ShadowPublicKey) -> u64 {
        self.inner
            .read()
            .chain
            .balances
            .get(account)
            .copied()
            .unwrap_or(0)
    }

    /// While held, accepted transactions stay `Pending` and are not executed
    /// until [`release_held`](Self::release_held).
    pub fn hold_confirmations(&self, hold: bool) {
        self.inner.write().hold_confirmations = hold;
    }

    /// Execute every held transaction in submission order.
    pub fn release_held(&self) {
        let mut inner = self.inner.write();
        let held = std::mem::take(&mut inner.held);
        for (sig, tx) in held {
            let status = match inner.execute(&tx) {
                Ok(slot) => ConfirmationStatus::Confirmed { slot },
                Err(rejection) => {
                    warn!(signature = %sig, %rejection, "held transaction failed");
                    ConfirmationStatus::Failed(rejection)
                }
            };
            inner.statuses.insert(sig, status);
        }
    }

    /// The next `n` submissions fail with a transport error before reaching
    /// the ledger.
    pub fn fail_next_submits(&self, n: u32) {
        self.inner.write().fail_next_submits = n;
    }

    /// The next `n` balance reads fail with a transport error.
    pub fn fail_next_reads(&self, n: u32) {
        self.inner.write().fail_next_reads = n;
    }

    /// The next executed transaction fails at instruction `index`. One-shot.
    pub fn fail_instruction(&self, index: usize) {
        self.inner.write().fail_instruction = Some(index);
    }

    /// Age the blockhash window by `n` slots.
    pub fn advance_slots(&self, n: u64) {
        let mut inner = self.inner.write();
        for _ in 0..n {
            inner.advance_slot();
        }
    }

    pub fn set_unix_timestamp(&self, ts: i64) {
        self.inner.write().unix_timestamp = ts;
    }

    /// Submissions that reached the ledger (injected transport failures
    /// excluded).
    pub fn submission_count(&self) -> u64 {
        self.inner.read().submissions
    }

    pub fn record_count(&self, kind: RecordKind) -> usize {
        self.inner
            .read()
            .chain
            .records
            .values()
            .filter(|bytes| bytes.first() == Some(&kind.tag()))
            .count()
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn get_balance(&self, account: &ShadowPublicKey) -> Result<u64> {
        let mut inner = self.inner.write();
        if inner.fail_next_reads > 0 {
            inner.fail_next_reads -= 1;
            return Err(ShadowError::NetworkError("injected read failure".into()));
        }
        Ok(inner.chain.balances.get(account).copied().unwrap_or(0))
    }

    async fn latest_blockhash(&self) -> Result<Blockhash> {
        let inner = self.inner.read();
        inner
            .recent_blockhashes
            .back()
            .copied()
            .ok_or_else(|| ShadowError::NetworkError("no blockhash available".into()))
    }

    async fn submit_transaction(&self, tx: &LedgerTransaction) -> Result<TxSignature> {
        let mut inner = self.inner.write();
        if inner.fail_next_submits > 0 {
            inner.fail_next_submits -= 1;
            return Err(ShadowError::NetworkError("injected submit failure".into()));
        }
        inner.submissions += 1;

        let signature = tx.signature().ok_or_else(|| {
            ShadowError::from(LedgerRejection::MissingSignature(tx.message.fee_payer.to_string()))
        })?;
        if inner.statuses.contains_key(&signature) {
            return Err(LedgerRejection::AlreadyProcessed(signature.0.clone()).into());
        }
        if !tx.verify_signatures() {
            return Err(LedgerRejection::MissingSignature(tx.message.fee_payer.to_string()).into());
        }
        if !inner.recent_blockhashes.contains(&tx.message.recent_blockhash) {
            return Err(LedgerRejection::BlockhashNotFound.into());
        }

        if inner.hold_confirmations {
            debug!(signature = %signature, "holding transaction");
            inner.statuses.insert(signature.clone(), ConfirmationStatus::Pending);
            inner.held.push((signature.clone(), tx.clone()));
            return Ok(signature);
        }

        match inner.execute(tx) {
            Ok(slot) => {
                debug!(signature = %signature, slot, "transaction committed");
                inner
                    .statuses
                    .insert(signature.clone(), ConfirmationStatus::Confirmed { slot });
                Ok(signature)
            }
            Err(rejection) => {
                debug!(signature = %signature, %rejection, "transaction rejected");
                inner
                    .statuses
                    .insert(signature, ConfirmationStatus::Failed(rejection.clone()));
                Err(rejection.into())
            }
        }
    }

    async fn confirmation_status(&self, signature: &TxSignature) -> Result<ConfirmationStatus> {
        Ok(self
            .inner
            .read()
            .statuses
            .get(signature)
            .cloned()
            .unwrap_or(ConfirmationStatus::Unknown))
    }

    async fn get_record(&self, key: &RecordKey) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().chain.records.get(key).cloned())
    }

    async fn records_of_kind(&self, kind: RecordKind) -> Result<Vec<(RecordKey, Vec<u8>)>> {
        Ok(self
            .inner
            .read()
            .chain
            .records
            .iter()
            .filter(|(_, bytes)| bytes.first() == Some(&kind.tag()))
            .map(|(key, bytes)| (*key, bytes.clone()))
            .collect())
    }
}
