// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # shadowpost developer tool
//!
//! Entry point for the `shadowpost` binary. Parses CLI arguments, sets up
//! logging and dispatches to one of:
//!
//! - `derive`: shadow identities for a wallet seed and user id
//! - `rank`: where a candidate bid lands among existing bids
//! - `split`: platform fee and the three-way revenue split for a bid
//! - `simulate`: fund, post, rank and message against an in-memory ledger
//!
//! Results are printed to stdout as pretty JSON.

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;

use shadowpost_protocol::composer::{CancelToken, PostOutcome, PostRequest, PostTransactionComposer};
use shadowpost_protocol::config::ClientConfig;
use shadowpost_protocol::crypto::ShadowKeypair;
use shadowpost_protocol::identity::{Session, ShadowWalletRegistry};
use shadowpost_protocol::ledger::{posts_for_target, InMemoryLedger, TargetDescriptor};
use shadowpost_protocol::messaging::{MessagingService, SealedPairShield};
use shadowpost_protocol::ranking::{rank_posts, BidSnapshot};
use shadowpost_protocol::revenue::{platform_fee, split_revenue};
use shadowpost_protocol::social::InMemorySocialBackend;
use shadowpost_protocol::wallet::{LocalKeypairWallet, WalletKind, WalletProvider};

use cli::{Commands, MasterArgs, ShadowpostCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ShadowpostCli::parse();
    logging::init_logging("shadowpost=info,shadowpost_protocol=info", cli.log_format);

    match cli.command {
        Commands::Derive(args) => derive(args).await,
        Commands::Rank(args) => rank(args),
        Commands::Split(args) => split(args),
        Commands::Simulate(args) => simulate(args).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn primary_wallet(master: &MasterArgs) -> Result<LocalKeypairWallet> {
    let bytes = hex::decode(master.wallet_seed.trim()).context("wallet seed is not valid hex")?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("wallet seed must be 32 bytes, got {}", b.len()))?;
    Ok(LocalKeypairWallet::new(WalletKind::Other("cli".into()), ShadowKeypair::from_seed(&seed)))
}

async fn unlocked_session(wallet: &LocalKeypairWallet, user_id: &str) -> Result<Session> {
    let session = Session::new();
    session
        .unlock(wallet, user_id)
        .await
        .context("failed to unlock session")?;
    Ok(session)
}

// ---------------------------------------------------------------------------
// derive
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct DerivedIdentity {
    index: u32,
    public_key: String,
    messaging_key: String,
    display_name: String,
}

async fn derive(args: cli::DeriveArgs) -> Result<()> {
    let wallet = primary_wallet(&args.master)?;
    let session = unlocked_session(&wallet, &args.master.user_id).await?;
    tracing::info!(wallet = %wallet.public_key(), count = args.count, "deriving identities");

    // Registry with empty backends: derivation itself touches neither.
    let registry = ShadowWalletRegistry::new(
        Arc::new(InMemoryLedger::new()),
        Arc::new(InMemorySocialBackend::new()),
    );

    let end = args
        .from
        .checked_add(args.count)
        .context("identity index range overflows u32")?;
    let mut out = Vec::with_capacity(args.count as usize);
    for index in args.from..end {
        let identity = registry.restore(&session, index)?;
        let messaging = session.messaging_keypair(index)?;
        out.push(DerivedIdentity {
            index,
            public_key: identity.public_key.to_base58(),
            messaging_key: messaging.public_key().to_base58(),
            display_name: identity.display_name,
        });
    }
    session.lock();
    print_json(&out)
}

// ---------------------------------------------------------------------------
// rank / split
// ---------------------------------------------------------------------------

fn rank(args: cli::RankArgs) -> Result<()> {
    let snapshot = BidSnapshot::new(args.bids);
    let position = snapshot.position_for(args.candidate)?;
    print_json(&serde_json::json!({
        "candidate": args.candidate,
        "position": position,
        "existing_bids": snapshot.len(),
        "range": snapshot.range(),
    }))
}

fn split(args: cli::SplitArgs) -> Result<()> {
    let fee = platform_fee(args.bid);
    let total = args
        .bid
        .checked_add(fee)
        .context("bid plus fee overflows u64")?;
    print_json(&serde_json::json!({
        "bid": args.bid,
        "platform_fee": fee,
        "split": split_revenue(fee),
        "total_cost": total,
    }))
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

fn load_config(path: Option<&std::path::Path>) -> Result<ClientConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            Ok(ClientConfig::from_json_str(&raw)?)
        }
        None => Ok(ClientConfig::default()),
    }
}

async fn simulate(args: cli::SimulateArgs) -> Result<()> {
    if args.bids.is_empty() {
        bail!("--bids must name at least one bid");
    }
    let config = load_config(args.config.as_deref())?;
    let target = TargetDescriptor::new(args.platform, &args.target)?;

    let ledger = Arc::new(InMemoryLedger::new());
    let social = Arc::new(InMemorySocialBackend::with_targets([target.clone()]));
    let wallet = primary_wallet(&args.master)?;
    ledger.airdrop(&wallet.public_key(), args.airdrop);

    let session = unlocked_session(&wallet, &args.master.user_id).await?;
    let registry = ShadowWalletRegistry::new(ledger.clone(), social.clone());
    let composer = PostTransactionComposer::new(ledger.clone(), social.clone(), config.clone());
    let cancel = CancelToken::never();

    tracing::info!(handle = %target, posts = args.bids.len(), "starting simulation");

    let mut receipts = Vec::with_capacity(args.bids.len());
    let mut authors = Vec::with_capacity(args.bids.len());
    for (n, &bid) in args.bids.iter().enumerate() {
        let identity = registry.generate_next(&session)?;
        let request = PostRequest {
            target: target.clone(),
            content: format!("post #{} from {}", n + 1, identity.display_name),
            bid_lamports: bid,
        };

        let mut outcome = composer
            .post(&session, &registry, &wallet, identity.index, request, &cancel)
            .await
            .with_context(|| format!("post with bid {bid} failed"))?;
        // The in-memory ledger confirms on submit, so one resume is plenty.
        if let PostOutcome::FundingPending(pending) = outcome {
            tracing::warn!(flow = %pending.flow_id, "funding still pending, resuming");
            outcome = composer
                .resume_funding(&session, &registry, pending, &cancel)
                .await?;
        }
        match outcome {
            PostOutcome::Posted(receipt) => receipts.push(receipt),
            PostOutcome::FundingPending(pending) => {
                bail!("funding {} never confirmed", pending.funding_signature)
            }
        }
        authors.push(identity);
    }

    let feed = rank_posts(posts_for_target(ledger.as_ref(), &target).await?);

    let mut messages = Vec::new();
    if !args.no_messages && authors.len() >= 2 {
        let messaging = MessagingService::new(ledger.clone(), Arc::new(SealedPairShield), config);
        let (a, b) = (&authors[0], &authors[1]);
        let a_keys = session.signing_keypair(a.index)?;
        let b_keys = session.signing_keypair(b.index)?;

        messaging
            .register(&a_keys, session.messaging_keypair(a.index)?.public_key())
            .await?;
        messaging
            .register(&b_keys, session.messaging_keypair(b.index)?.public_key())
            .await?;
        messaging
            .send(&a_keys, &b.public_key, &format!("hi {}, saw your post", b.display_name))
            .await?;
        messaging.send(&b_keys, &a.public_key, "likewise").await?;

        messages = messaging.inbox(&b_keys).await?;
    }

    registry.refresh_balances().await;
    session.lock();

    print_json(&serde_json::json!({
        "target": target.to_string(),
        "primary_wallet_balance": ledger.balance_of(&wallet.public_key()),
        "identities": registry.identities(),
        "receipts": receipts,
        "feed": feed,
        "inbox_of_second_identity": messages,
    }))
}
