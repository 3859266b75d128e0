//! The post flow itself.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::cancel::CancelToken;
use super::confirm::{await_confirmation, Confirmation};
use super::funding::{submit_funding, FundingIntent, FundingSubmission};
use super::retry::RetryPolicy;
use super::state::{PostState, PostStateMachine, Transition};
use crate::config::{ClientConfig, MAX_CONTENT_LENGTH, MIN_BID_LAMPORTS};
use crate::crypto::{ShadowKeypair, ShadowPublicKey};
use crate::error::{FundingFailure, Result, ShadowError};
use crate::identity::{Session, ShadowWalletRegistry};
use crate::ledger::{
    bid_vault_address, post_key, Blockhash, ConfirmationStatus, LedgerClient, LedgerRejection,
    LedgerTransaction, Platform, RecordKey, TargetDescriptor, TransactionBuilder, TxSignature,
};
use crate::ranking::{BidRange, BidSnapshot};
use crate::revenue::{platform_fee, split_revenue, RevenueSplit};
use crate::social::SocialBackend;
use crate::wallet::WalletProvider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRequest {
    pub target: TargetDescriptor,
    pub content: String,
    pub bid_lamports: u64,
}

impl PostRequest {
    /// Normalizes the handle; see [`TargetDescriptor::new`].
    pub fn new(platform: Platform, handle: &str, content: impl Into<String>, bid_lamports: u64) -> Result<Self> {
        Ok(Self {
            target: TargetDescriptor::new(platform, handle)?,
            content: content.into(),
            bid_lamports,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub flow_id: Uuid,
    pub signature: TxSignature,
    pub post_key: RecordKey,
    /// Rank against the bids that existed just before submission.
    pub position: u32,
    pub bid_lamports: u64,
    pub platform_fee: u64,
    pub split: RevenueSplit,
    pub slot: u64,
    pub history: Vec<Transition>,
}

/// The funding transfer was submitted but had not confirmed when the wait
/// window closed. Hand it back to [`PostTransactionComposer::resume_funding`]
/// to keep waiting, or drop it to abandon the post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFunding {
    pub flow_id: Uuid,
    pub identity_index: u32,
    pub request: PostRequest,
    pub intent: FundingIntent,
    pub funding_signature: TxSignature,
    pub required_lamports: u64,
    machine: PostStateMachine,
}

impl PendingFunding {
    pub fn history(&self) -> &[Transition] {
        self.machine.history()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostOutcome {
    Posted(PostReceipt),
    FundingPending(PendingFunding),
}

/// What the composer shows before anything is signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPreview {
    pub position: u32,
    pub range: BidRange,
    pub platform_fee: u64,
    pub split: RevenueSplit,
    /// Balance the identity needs before the post can be composed.
    pub required_lamports: u64,
}

/// Turns a post request into one confirmed ledger transaction, funding
/// the shadow identity from the primary wallet first when needed.
pub struct PostTransactionComposer {
    ledger: Arc<dyn LedgerClient>,
    social: Arc<dyn SocialBackend>,
    config: ClientConfig,
    retry: RetryPolicy,
    locks: DashMap<ShadowPublicKey, Arc<Mutex<()>>>,
}

impl PostTransactionComposer {
    pub fn new(ledger: Arc<dyn LedgerClient>, social: Arc<dyn SocialBackend>, config: ClientConfig) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            ledger,
            social,
            config,
            retry,
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `bid + platform_fee(bid) + fee_buffer`.
    pub fn required_balance(&self, bid_lamports: u64) -> u64 {
        bid_lamports
            .saturating_add(platform_fee(bid_lamports))
            .saturating_add(self.config.fee_buffer_lamports)
    }

    /// Position, slider range and costs for a candidate bid. Reads the
    /// ledger, writes nothing.
    pub async fn preview(&self, target: &TargetDescriptor, bid_lamports: u64) -> Result<PostPreview> {
        let snapshot = self.snapshot(target).await?;
        let fee = platform_fee(bid_lamports);
        Ok(PostPreview {
            position: snapshot.position_for(bid_lamports)?,
            range: snapshot.range(),
            platform_fee: fee,
            split: split_revenue(fee),
            required_lamports: self.required_balance(bid_lamports),
        })
    }

    /// Publish `request` from the shadow identity at `identity_index`.
    ///
    /// `funder` is the primary wallet; it is only asked to sign when the
    /// identity can't cover the post on its own.
    pub async fn post(
        &self,
        session: &Session,
        registry: &ShadowWalletRegistry,
        funder: &dyn WalletProvider,
        identity_index: u32,
        request: PostRequest,
        cancel: &CancelToken,
    ) -> Result<PostOutcome> {
        let flow_id = Uuid::new_v4();
        let span = info_span!("post", flow = %flow_id, identity_index, target = %request.target);
        async move {
            self.validate(&request).await?;
            let identity = registry.get(identity_index)?;
            let keypair = session.signing_keypair(identity_index)?;
            if keypair.public_key() != identity.public_key {
                return Err(ShadowError::UnknownIdentity(identity_index));
            }

            let lock = self.lock_for(&identity.public_key);
            let _guard = lock.lock().await;

            let mut machine = PostStateMachine::new();
            machine.transition(PostState::CheckingBalance);
            let required = self.required_balance(request.bid_lamports);
            let balance = match self.balance_for(registry, &identity.public_key, required).await {
                Ok(balance) => balance,
                Err(e) => {
                    machine.fail();
                    return Err(e);
                }
            };

            if balance < required {
                machine.transition(PostState::Funding);
                let intent = FundingIntent {
                    shadow: identity.public_key,
                    post_key: post_key(&identity.public_key, &request.target),
                    bid_lamports: request.bid_lamports,
                    amount: required - balance,
                };
                info!(needed = intent.amount, balance, required, "identity short, funding");

                let submitted = match submit_funding(self.ledger.as_ref(), &self.retry, funder, &intent).await {
                    Ok(submitted) => submitted,
                    Err(e) => {
                        machine.fail();
                        return Err(e);
                    }
                };
                if let FundingSubmission::Submitted(funding_signature) = submitted {
                    let pending = PendingFunding {
                        flow_id,
                        identity_index,
                        request,
                        intent,
                        funding_signature,
                        required_lamports: required,
                        machine,
                    };
                    return self
                        .wait_for_funding(pending, &keypair, registry, cancel)
                        .await;
                }
                self.recheck_funded(registry, &identity.public_key, required, &mut machine)
                    .await?;
            }

            self.publish(flow_id, &keypair, registry, &request, machine, cancel)
                .await
                .map(PostOutcome::Posted)
        }
        .instrument(span)
        .await
    }

    /// Keep waiting on a funding transfer that was still unconfirmed when
    /// [`post`](Self::post) returned.
    pub async fn resume_funding(
        &self,
        session: &Session,
        registry: &ShadowWalletRegistry,
        pending: PendingFunding,
        cancel: &CancelToken,
    ) -> Result<PostOutcome> {
        let span = info_span!("resume_funding", flow = %pending.flow_id, identity_index = pending.identity_index);
        async move {
            let keypair = session.signing_keypair(pending.identity_index)?;
            if keypair.public_key() != pending.intent.shadow {
                return Err(ShadowError::UnknownIdentity(pending.identity_index));
            }
            let lock = self.lock_for(&pending.intent.shadow);
            let _guard = lock.lock().await;
            self.wait_for_funding(pending, &keypair, registry, cancel).await
        }
        .instrument(span)
        .await
    }

    async fn validate(&self, request: &PostRequest) -> Result<()> {
        if request.bid_lamports < MIN_BID_LAMPORTS {
            return Err(ShadowError::BidTooLow {
                bid: request.bid_lamports,
                minimum: MIN_BID_LAMPORTS,
            });
        }
        if request.content.is_empty() || request.content.len() > MAX_CONTENT_LENGTH {
            return Err(ShadowError::InvalidInput(format!(
                "content must be 1-{} bytes, got {}",
                MAX_CONTENT_LENGTH,
                request.content.len()
            )));
        }
        if !self.social.target_exists(&request.target).await? {
            return Err(ShadowError::TargetNotFound(request.target.to_string()));
        }
        Ok(())
    }

    fn lock_for(&self, key: &ShadowPublicKey) -> Arc<Mutex<()>> {
        self.locks.entry(*key).or_default().clone()
    }

    async fn snapshot(&self, target: &TargetDescriptor) -> Result<BidSnapshot> {
        self.retry
            .run("bid_snapshot", || BidSnapshot::fetch(self.ledger.as_ref(), target))
            .await
    }

    async fn live_balance(&self, key: &ShadowPublicKey) -> Result<u64> {
        self.retry
            .run("get_balance", || self.ledger.get_balance(key))
            .await
    }

    /// Cached balance if it already covers `required`, otherwise a live
    /// read. Another session may have funded the identity meanwhile.
    async fn balance_for(
        &self,
        registry: &ShadowWalletRegistry,
        key: &ShadowPublicKey,
        required: u64,
    ) -> Result<u64> {
        if let Some(cached) = registry.cached_balance(key) {
            if cached >= required {
                return Ok(cached);
            }
        }
        let live = self.live_balance(key).await?;
        registry.set_cached_balance(*key, live);
        Ok(live)
    }

    async fn recheck_funded(
        &self,
        registry: &ShadowWalletRegistry,
        key: &ShadowPublicKey,
        required: u64,
        machine: &mut PostStateMachine,
    ) -> Result<()> {
        let available = match self.live_balance(key).await {
            Ok(balance) => balance,
            Err(e) => {
                machine.fail();
                return Err(e);
            }
        };
        registry.set_cached_balance(*key, available);
        if available < required {
            machine.fail();
            return Err(ShadowError::FundingFailed {
                reason: FundingFailure::StillShort { required, available },
            });
        }
        Ok(())
    }

    async fn wait_for_funding(
        &self,
        mut pending: PendingFunding,
        keypair: &ShadowKeypair,
        registry: &ShadowWalletRegistry,
        cancel: &CancelToken,
    ) -> Result<PostOutcome> {
        let waited = await_confirmation(
            self.ledger.as_ref(),
            &pending.funding_signature,
            self.config.funding_timeout(),
            self.config.poll_interval(),
            cancel,
        )
        .await;

        match waited {
            Ok(Confirmation::Landed { slot }) => {
                debug!(slot, "funding confirmed");
            }
            Ok(Confirmation::TimedOut) => {
                info!(signature = %pending.funding_signature, "funding not yet confirmed, returning pending");
                return Ok(PostOutcome::FundingPending(pending));
            }
            Err(ShadowError::Cancelled) => {
                pending.machine.fail();
                return Err(ShadowError::Cancelled);
            }
            Err(e) => {
                pending.machine.fail();
                return Err(ShadowError::FundingFailed {
                    reason: FundingFailure::Rejected(e.to_string()),
                });
            }
        }

        self.recheck_funded(
            registry,
            &pending.intent.shadow,
            pending.required_lamports,
            &mut pending.machine,
        )
        .await?;
        self.publish(
            pending.flow_id,
            keypair,
            registry,
            &pending.request,
            pending.machine,
            cancel,
        )
        .await
        .map(PostOutcome::Posted)
    }

    /// Create-post, bid payment and fee split in one transaction.
    fn compose(
        &self,
        keypair: &ShadowKeypair,
        request: &PostRequest,
        blockhash: Blockhash,
    ) -> Result<LedgerTransaction> {
        let author = keypair.public_key();
        let fee = platform_fee(request.bid_lamports);
        let mut builder = TransactionBuilder::new(author)
            .recent_blockhash(blockhash)
            .create_post(
                author,
                request.target.clone(),
                request.content.clone(),
                request.bid_lamports,
            )
            .transfer(author, bid_vault_address(&request.target), request.bid_lamports);
        for (recipient, lamports) in split_revenue(fee).transfers() {
            if lamports > 0 {
                builder = builder.transfer(author, recipient, lamports);
            }
        }
        let mut tx = LedgerTransaction::new(builder.build()?);
        tx.sign(keypair)?;
        Ok(tx)
    }

    /// Compose, submit and confirm. Runs under the identity lock.
    async fn publish(
        &self,
        flow_id: Uuid,
        keypair: &ShadowKeypair,
        registry: &ShadowWalletRegistry,
        request: &PostRequest,
        mut machine: PostStateMachine,
        cancel: &CancelToken,
    ) -> Result<PostReceipt> {
        let result = self
            .publish_inner(keypair, request, &mut machine, cancel)
            .await;
        let (signature, slot, position) = match result {
            Ok(landed) => landed,
            Err(e) => {
                machine.fail();
                warn!(error = %e, "post failed");
                return Err(e);
            }
        };
        machine.transition(PostState::Done);

        let author = keypair.public_key();
        match self.ledger.get_balance(&author).await {
            Ok(balance) => registry.set_cached_balance(author, balance),
            Err(e) => warn!(error = %e, "post-publish balance refresh failed"),
        }

        let fee = platform_fee(request.bid_lamports);
        info!(signature = %signature, position, slot, "post confirmed");
        Ok(PostReceipt {
            flow_id,
            signature,
            post_key: post_key(&author, &request.target),
            position,
            bid_lamports: request.bid_lamports,
            platform_fee: fee,
            split: split_revenue(fee),
            slot,
            history: machine.history().to_vec(),
        })
    }

    async fn publish_inner(
        &self,
        keypair: &ShadowKeypair,
        request: &PostRequest,
        machine: &mut PostStateMachine,
        cancel: &CancelToken,
    ) -> Result<(TxSignature, u64, u32)> {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut earlier: Vec<TxSignature> = Vec::new();
        // Blockhash whose payload already failed at execution, and why.
        let mut stale: Option<(Blockhash, LedgerRejection)> = None;

        'compose: loop {
            if cancel.is_cancelled() {
                return Err(ShadowError::Cancelled);
            }
            machine.transition(PostState::Composing);
            let position = self
                .snapshot(&request.target)
                .await?
                .position_for(request.bid_lamports)?;
            let blockhash = match stale.take() {
                None => {
                    self.retry
                        .run("latest_blockhash", || self.ledger.latest_blockhash())
                        .await?
                }
                Some((old, rejection)) => match self.blockhash_after(old).await? {
                    Some(fresh) => fresh,
                    None => return Err(rejection.into()),
                },
            };
            let tx = self.compose(keypair, request, blockhash)?;
            let signature = tx
                .signature()
                .ok_or_else(|| ShadowError::Crypto("composed transaction is unsigned".into()))?;

            machine.transition(PostState::Submitting);
            loop {
                attempts += 1;
                let submitted = self
                    .retry
                    .run("submit_post", || self.ledger.submit_transaction(&tx))
                    .await;
                match submitted {
                    Ok(_) => {}
                    Err(ShadowError::AlreadyProcessed(_)) => {
                        // Same blockhash and content as an attempt that failed
                        // at execution. Signing again needs a newer blockhash.
                        if let Ok(ConfirmationStatus::Failed(rejection)) =
                            self.ledger.confirmation_status(&signature).await
                        {
                            if attempts >= self.retry.max_attempts {
                                return Err(rejection.into());
                            }
                            warn!(signature = %signature, %rejection, "identical payload failed earlier, recomposing");
                            stale = Some((blockhash, rejection));
                            continue 'compose;
                        }
                        debug!(signature = %signature, "replay, treating as landed");
                    }
                    Err(ShadowError::BlockhashExpired) if attempts < self.retry.max_attempts => {
                        warn!(attempts, "blockhash expired, recomposing");
                        earlier.push(signature);
                        continue 'compose;
                    }
                    Err(ShadowError::DuplicatePost(key)) => {
                        // A previous attempt of this same flow may have landed
                        // after we gave up on it.
                        if let Some(landed) = self.find_landed(&earlier).await {
                            info!(signature = %landed.0, "earlier attempt landed");
                            return Ok((landed.0, landed.1, position));
                        }
                        return Err(ShadowError::DuplicatePost(key));
                    }
                    Err(e) => return Err(e),
                }

                machine.transition(PostState::Confirming);
                let confirmed = await_confirmation(
                    self.ledger.as_ref(),
                    &signature,
                    self.config.confirm_timeout(),
                    self.config.poll_interval(),
                    &CancelToken::never(),
                )
                .await?;
                match confirmed {
                    Confirmation::Landed { slot } => return Ok((signature, slot, position)),
                    Confirmation::TimedOut if attempts < self.retry.max_attempts => {
                        warn!(signature = %signature, attempts, "confirmation timed out, resubmitting");
                        machine.transition(PostState::Submitting);
                    }
                    Confirmation::TimedOut => {
                        return Err(ShadowError::TransactionTimeout {
                            signature: signature.0,
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                }
            }
        }
    }

    /// Poll for a blockhash other than `old`, for at most the confirm
    /// window. `None` if the ledger never moved on.
    async fn blockhash_after(&self, old: Blockhash) -> Result<Option<Blockhash>> {
        let deadline = Instant::now() + self.config.confirm_timeout();
        loop {
            let current = self
                .retry
                .run("latest_blockhash", || self.ledger.latest_blockhash())
                .await?;
            if current != old {
                return Ok(Some(current));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn find_landed(&self, signatures: &[TxSignature]) -> Option<(TxSignature, u64)> {
        for signature in signatures {
            if let Ok(ConfirmationStatus::Confirmed { slot }) =
                self.ledger.confirmation_status(signature).await
            {
                return Some((signature.clone(), slot));
            }
        }
        None
    }
}
