//! End-to-end tests for the shadowpost core.
//!
//! Each test wires a fresh in-memory ledger, social backend and primary
//! wallet, unlocks a session and drives the public API the way a client
//! would: derive identities, post with funding, rank, message.

use std::sync::Arc;
use std::time::Duration;

use shadowpost_protocol::composer::{
    cancel_pair, CancelToken, PostOutcome, PostRequest, PostState, PostTransactionComposer,
};
use shadowpost_protocol::config::{
    ClientConfig, DEFAULT_FEE_BUFFER_LAMPORTS, LAMPORTS_PER_SOL, NETWORK_FEE_LAMPORTS_PER_SIGNATURE,
};
use shadowpost_protocol::crypto::ShadowKeypair;
use shadowpost_protocol::error::{FundingFailure, ShadowError};
use shadowpost_protocol::identity::{Session, ShadowWalletRegistry};
use shadowpost_protocol::ledger::{
    bid_vault_address, posts_for_target, InMemoryLedger, Platform, RecordKind, TargetDescriptor,
};
use shadowpost_protocol::messaging::{MessagingService, SealedPairShield};
use shadowpost_protocol::ranking::rank_posts;
use shadowpost_protocol::revenue::{platform_fee, split_revenue, COMMUNITY_POOL, OPERATIONS, PRIMARY_TREASURY};
use shadowpost_protocol::social::InMemorySocialBackend;
use shadowpost_protocol::wallet::{LocalKeypairWallet, SignRequest, WalletKind, WalletProvider};

const SOL: u64 = LAMPORTS_PER_SOL;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Harness {
    ledger: Arc<InMemoryLedger>,
    wallet: LocalKeypairWallet,
    session: Session,
    registry: ShadowWalletRegistry,
    composer: PostTransactionComposer,
    alice: TargetDescriptor,
}

fn fast_config() -> ClientConfig {
    ClientConfig {
        retry_base_delay_ms: 1,
        poll_interval_ms: 5,
        ..ClientConfig::default()
    }
}

async fn harness() -> Harness {
    let ledger = Arc::new(InMemoryLedger::new());
    let alice = TargetDescriptor::new(Platform::Twitter, "@Alice").unwrap();
    let bob = TargetDescriptor::new(Platform::Twitter, "bob").unwrap();
    let social = Arc::new(InMemorySocialBackend::with_targets([alice.clone(), bob]));

    let wallet = LocalKeypairWallet::new(WalletKind::Phantom, ShadowKeypair::from_seed(&[11; 32]));
    ledger.airdrop(&wallet.public_key(), 10 * SOL);

    let session = Session::new();
    session.unlock(&wallet, "user-42").await.unwrap();
    let registry = ShadowWalletRegistry::new(ledger.clone(), social.clone());
    let composer = PostTransactionComposer::new(ledger.clone(), social.clone(), fast_config());

    Harness {
        ledger,
        wallet,
        session,
        registry,
        composer,
        alice,
    }
}

impl Harness {
    fn request(&self, content: &str, bid: u64) -> PostRequest {
        PostRequest {
            target: self.alice.clone(),
            content: content.into(),
            bid_lamports: bid,
        }
    }

    async fn post(&self, index: u32, request: PostRequest) -> Result<PostOutcome, ShadowError> {
        self.composer
            .post(
                &self.session,
                &self.registry,
                &self.wallet,
                index,
                request,
                &CancelToken::never(),
            )
            .await
    }
}

fn posted(outcome: PostOutcome) -> shadowpost_protocol::composer::PostReceipt {
    match outcome {
        PostOutcome::Posted(receipt) => receipt,
        PostOutcome::FundingPending(p) => panic!("unexpected pending funding: {:?}", p.funding_signature),
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identities_are_reproducible_across_sessions() {
    let wallet = LocalKeypairWallet::new(WalletKind::Solflare, ShadowKeypair::from_seed(&[3; 32]));

    let first = Session::new();
    first.unlock(&wallet, "user-1").await.unwrap();
    let second = Session::new();
    second.unlock(&wallet, "user-1").await.unwrap();

    for index in [0, 1, 7] {
        let a = first.signing_keypair(index).unwrap();
        let b = second.signing_keypair(index).unwrap();
        assert_eq!(a.public_key(), b.public_key());

        let msg = first.messaging_keypair(index).unwrap().public_key();
        assert_eq!(msg, second.messaging_keypair(index).unwrap().public_key());
        assert_ne!(msg.as_bytes(), a.public_key().as_bytes());
    }
    assert_ne!(
        first.signing_keypair(0).unwrap().public_key(),
        first.signing_keypair(1).unwrap().public_key()
    );
}

// ---------------------------------------------------------------------------
// Posting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unfunded_identity_is_funded_and_posts_atomically() {
    let h = harness().await;
    let identity = h.registry.generate_next(&h.session).unwrap();
    let bid = SOL / 20;
    let fee = platform_fee(bid);
    let required = bid + fee + DEFAULT_FEE_BUFFER_LAMPORTS;

    let receipt = posted(h.post(0, h.request("first!", bid)).await.unwrap());

    assert_eq!(receipt.position, 1);
    assert_eq!(receipt.platform_fee, fee);
    let states: Vec<PostState> = receipt.history.iter().map(|t| t.to).collect();
    assert_eq!(
        states,
        vec![
            PostState::CheckingBalance,
            PostState::Funding,
            PostState::Composing,
            PostState::Submitting,
            PostState::Confirming,
            PostState::Done,
        ]
    );

    // The wallet was asked for exactly the shortfall.
    assert!(h
        .wallet
        .requests()
        .contains(&SignRequest::Transaction { outgoing_lamports: required }));

    let split = split_revenue(fee);
    assert_eq!(h.ledger.balance_of(&bid_vault_address(&h.alice)), bid);
    assert_eq!(h.ledger.balance_of(&PRIMARY_TREASURY), split.primary);
    assert_eq!(h.ledger.balance_of(&COMMUNITY_POOL), split.community);
    assert_eq!(h.ledger.balance_of(&OPERATIONS), split.operations);
    assert_eq!(
        h.ledger.balance_of(&identity.public_key),
        DEFAULT_FEE_BUFFER_LAMPORTS - NETWORK_FEE_LAMPORTS_PER_SIGNATURE
    );
    assert_eq!(
        h.registry.cached_balance(&identity.public_key),
        Some(DEFAULT_FEE_BUFFER_LAMPORTS - NETWORK_FEE_LAMPORTS_PER_SIGNATURE)
    );
    assert_eq!(h.ledger.record_count(RecordKind::Post), 1);
}

#[tokio::test]
async fn funded_identity_skips_the_wallet() {
    let h = harness().await;
    let identity = h.registry.generate_next(&h.session).unwrap();
    h.ledger.airdrop(&identity.public_key, SOL);

    let receipt = posted(h.post(0, h.request("hello", SOL / 10)).await.unwrap());
    assert!(!receipt.history.iter().any(|t| t.to == PostState::Funding));
    assert!(!h
        .wallet
        .requests()
        .iter()
        .any(|r| matches!(r, SignRequest::Transaction { .. })));
}

#[tokio::test]
async fn ranking_follows_bids() {
    let h = harness().await;
    for _ in 0..3 {
        let identity = h.registry.generate_next(&h.session).unwrap();
        h.ledger.airdrop(&identity.public_key, SOL);
    }

    let low = posted(h.post(0, h.request("low", SOL / 100)).await.unwrap());
    let high = posted(h.post(1, h.request("high", SOL / 2)).await.unwrap());
    let middle = posted(h.post(2, h.request("middle", SOL / 10)).await.unwrap());
    assert_eq!((low.position, high.position, middle.position), (1, 1, 2));

    let preview = h.composer.preview(&h.alice, SOL / 2).await.unwrap();
    assert_eq!(preview.position, 1);
    assert_eq!(preview.range.max, SOL / 2 + SOL);

    let ranked = rank_posts(posts_for_target(h.ledger.as_ref(), &h.alice).await.unwrap());
    let contents: Vec<&str> = ranked.iter().map(|r| r.post.content.as_str()).collect();
    assert_eq!(contents, vec!["high", "middle", "low"]);
}

#[tokio::test]
async fn declined_funding_writes_nothing() {
    let h = harness().await;
    let identity = h.registry.generate_next(&h.session).unwrap();
    h.wallet.set_decline(true);
    let bid = SOL / 20;

    let err = h.post(0, h.request("nope", bid)).await.unwrap_err();
    assert!(matches!(
        err,
        ShadowError::FundingFailed {
            reason: FundingFailure::WalletDeclined
        }
    ));
    assert!(err.is_wallet_side());

    let asked = h
        .wallet
        .requests()
        .into_iter()
        .find_map(|r| match r {
            SignRequest::Transaction { outgoing_lamports } => Some(outgoing_lamports),
            _ => None,
        })
        .unwrap();
    assert!(asked >= bid + platform_fee(bid) + DEFAULT_FEE_BUFFER_LAMPORTS);
    assert_eq!(h.ledger.record_count(RecordKind::Post), 0);
    assert_eq!(h.ledger.balance_of(&identity.public_key), 0);
}

#[tokio::test]
async fn failed_instruction_leaves_no_trace_and_retry_succeeds() {
    let bid = SOL / 10;
    let fee_recipients = [PRIMARY_TREASURY, COMMUNITY_POOL, OPERATIONS];

    // create-post, bid payment, then the three fee-split transfers.
    for failing in 0..5 {
        let h = harness().await;
        let identity = h.registry.generate_next(&h.session).unwrap();
        h.ledger.airdrop(&identity.public_key, SOL);
        let vault = bid_vault_address(&h.alice);

        h.ledger.fail_instruction(failing);
        let err = h.post(0, h.request("atomic", bid)).await.unwrap_err();
        assert!(matches!(err, ShadowError::LedgerRejected(_)), "instruction {failing}: {err:?}");
        assert_eq!(h.ledger.record_count(RecordKind::Post), 0, "instruction {failing}");
        assert_eq!(h.ledger.balance_of(&identity.public_key), SOL, "instruction {failing}");
        assert_eq!(h.ledger.balance_of(&vault), 0, "instruction {failing}");
        for recipient in &fee_recipients {
            assert_eq!(h.ledger.balance_of(recipient), 0, "instruction {failing}");
        }

        // Retrying straight away, with no other traffic in between, lands.
        posted(h.post(0, h.request("atomic", bid)).await.unwrap());
        assert_eq!(h.ledger.record_count(RecordKind::Post), 1);
        assert_eq!(h.ledger.balance_of(&vault), bid);
    }
}

#[tokio::test]
async fn second_post_on_same_target_is_rejected_once() {
    let h = harness().await;
    let identity = h.registry.generate_next(&h.session).unwrap();
    h.ledger.airdrop(&identity.public_key, SOL);

    posted(h.post(0, h.request("one", SOL / 10)).await.unwrap());
    let err = h.post(0, h.request("two", SOL / 10)).await.unwrap_err();
    assert!(matches!(err, ShadowError::DuplicatePost(_)));
    assert_eq!(h.ledger.record_count(RecordKind::Post), 1);
    assert_eq!(h.ledger.balance_of(&bid_vault_address(&h.alice)), SOL / 10);
}

#[tokio::test]
async fn transient_submit_failures_are_retried() {
    let h = harness().await;
    let identity = h.registry.generate_next(&h.session).unwrap();
    h.ledger.airdrop(&identity.public_key, SOL);

    h.ledger.fail_next_submits(2);
    posted(h.post(0, h.request("flaky", SOL / 10)).await.unwrap());
    assert_eq!(h.ledger.record_count(RecordKind::Post), 1);
}

#[tokio::test]
async fn local_validation_happens_before_any_io() {
    let h = harness().await;
    h.registry.generate_next(&h.session).unwrap();

    let too_low = h.post(0, h.request("x", 10)).await.unwrap_err();
    assert!(matches!(too_low, ShadowError::BidTooLow { .. }));

    let empty = h.post(0, h.request("", SOL / 10)).await.unwrap_err();
    assert!(matches!(empty, ShadowError::InvalidInput(_)));

    let mut unknown = h.request("who?", SOL / 10);
    unknown.target = TargetDescriptor::new(Platform::TikTok, "ghost").unwrap();
    assert!(matches!(
        h.post(0, unknown).await.unwrap_err(),
        ShadowError::TargetNotFound(_)
    ));

    assert_eq!(h.ledger.submission_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_funding_comes_back_pending_then_resumes() {
    let h = harness().await;
    h.registry.generate_next(&h.session).unwrap();
    h.ledger.hold_confirmations(true);

    let pending = match h.post(0, h.request("patience", SOL / 10)).await.unwrap() {
        PostOutcome::FundingPending(pending) => pending,
        PostOutcome::Posted(_) => panic!("funding should still be pending"),
    };
    assert_eq!(pending.history().last().map(|t| t.to), Some(PostState::Funding));
    assert_eq!(h.ledger.record_count(RecordKind::Post), 0);

    h.ledger.hold_confirmations(false);
    h.ledger.release_held();

    let outcome = h
        .composer
        .resume_funding(&h.session, &h.registry, pending, &CancelToken::never())
        .await
        .unwrap();
    let receipt = posted(outcome);
    assert_eq!(receipt.history.last().map(|t| t.to), Some(PostState::Done));
    assert_eq!(h.ledger.record_count(RecordKind::Post), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_funding_wait() {
    let h = harness().await;
    h.registry.generate_next(&h.session).unwrap();
    h.ledger.hold_confirmations(true);

    let (handle, token) = cancel_pair();
    let request = h.request("never mind", SOL / 10);
    let post = h
        .composer
        .post(&h.session, &h.registry, &h.wallet, 0, request, &token);
    let cancel = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
    };
    let (result, _) = tokio::join!(post, cancel);
    assert!(matches!(result, Err(ShadowError::Cancelled)));
    assert_eq!(h.ledger.record_count(RecordKind::Post), 0);
}

#[tokio::test]
async fn concurrent_posts_from_one_identity_both_land() {
    let h = harness().await;
    let identity = h.registry.generate_next(&h.session).unwrap();
    h.ledger.airdrop(&identity.public_key, SOL);

    let to_alice = h.request("to alice", SOL / 10);
    let to_bob = PostRequest::new(Platform::Twitter, "bob", "to bob", SOL / 10).unwrap();
    let (a, b) = tokio::join!(h.post(0, to_alice), h.post(0, to_bob));
    let (a, b) = (posted(a.unwrap()), posted(b.unwrap()));
    assert_ne!(a.signature, b.signature);
    assert_ne!(a.slot, b.slot);
    assert_eq!(h.ledger.record_count(RecordKind::Post), 2);
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shadow_identities_exchange_private_messages() {
    let h = harness().await;
    let a = h.registry.generate_next(&h.session).unwrap();
    let b = h.registry.generate_next(&h.session).unwrap();
    h.ledger.airdrop(&a.public_key, SOL);
    h.ledger.airdrop(&b.public_key, SOL);

    let messaging = MessagingService::new(h.ledger.clone(), Arc::new(SealedPairShield), fast_config());
    let a_keys = h.session.signing_keypair(a.index).unwrap();
    let b_keys = h.session.signing_keypair(b.index).unwrap();

    let err = messaging.send(&a_keys, &b.public_key, "anyone?").await.unwrap_err();
    assert!(matches!(err, ShadowError::RecipientNotRegistered(_)));
    assert_eq!(h.ledger.record_count(RecordKind::Message), 0);

    let b_messaging = h.session.messaging_keypair(b.index).unwrap().public_key();
    messaging.register(&b_keys, b_messaging).await.unwrap();
    messaging.send(&a_keys, &b.public_key, "now?").await.unwrap();

    let inbox = messaging.inbox(&b_keys).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].body, "now?");
    assert_eq!(inbox[0].sender, a.public_key);

    let contacts = messaging.contacts(&b_keys).await.unwrap();
    assert_eq!(contacts[0].identity, a.public_key);
    assert_eq!(contacts[0].display_name, a.display_name);
}
