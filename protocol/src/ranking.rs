//! # Bid Ranking
//!
//! Posts about a target are ordered by bid, highest first. The composer
//! shows the user where a candidate bid would land *before* anything is
//! signed, and that number has to be live: recomputed on every slider
//! tick against the current snapshot, no ledger round trip.
//!
//! ```text
//! position(candidate) = |{ b in existing : b > candidate }| + 1
//! ```
//!
//! Ties go to the candidate. Matching the top bid puts you at #1. The
//! snapshot is kept sorted ascending so the count is one `partition_point`,
//! O(log n).
//!
//! Raising a bid can only move the position up or leave it unchanged.

use serde::{Deserialize, Serialize};

use crate::config::{BID_RANGE_HEADROOM_LAMPORTS, DEFAULT_BID_CEILING_LAMPORTS, MIN_BID_LAMPORTS};
use crate::error::{Result, ShadowError};
use crate::ledger::{posts_for_target, LedgerClient, PostRecord, RecordKey, TargetDescriptor};

/// Position a `candidate` bid would take among `sorted_existing`
/// (ascending). 1-based.
pub fn compute_position(candidate: u64, sorted_existing: &[u64]) -> Result<u32> {
    if candidate < MIN_BID_LAMPORTS {
        return Err(ShadowError::BidTooLow {
            bid: candidate,
            minimum: MIN_BID_LAMPORTS,
        });
    }
    debug_assert!(sorted_existing.windows(2).all(|w| w[0] <= w[1]));
    let not_above = sorted_existing.partition_point(|&b| b <= candidate);
    let above = sorted_existing.len() - not_above;
    Ok(u32::try_from(above).unwrap_or(u32::MAX - 1) + 1)
}

/// Slider bounds for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRange {
    pub min: u64,
    pub max: u64,
}

/// `min` is the protocol minimum. `max` is one SOL above the current top
/// bid, or one SOL flat when there are no bids yet.
pub fn bid_range_for_target(sorted_existing: &[u64]) -> BidRange {
    let max = match sorted_existing.last() {
        Some(&highest) => highest.saturating_add(BID_RANGE_HEADROOM_LAMPORTS),
        None => DEFAULT_BID_CEILING_LAMPORTS,
    };
    BidRange {
        min: MIN_BID_LAMPORTS,
        max: max.max(MIN_BID_LAMPORTS),
    }
}

/// The bids on one target at a moment in time, sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BidSnapshot {
    bids: Vec<u64>,
}

impl BidSnapshot {
    pub fn new(mut bids: Vec<u64>) -> Self {
        bids.sort_unstable();
        Self { bids }
    }

    pub fn from_posts<'a, I: IntoIterator<Item = &'a PostRecord>>(posts: I) -> Self {
        Self::new(posts.into_iter().map(|p| p.bid_lamports).collect())
    }

    /// Current snapshot for `target` straight from the ledger.
    pub async fn fetch<L: LedgerClient + ?Sized>(ledger: &L, target: &TargetDescriptor) -> Result<Self> {
        let posts = posts_for_target(ledger, target).await?;
        Ok(Self::from_posts(posts.iter().map(|(_, p)| p)))
    }

    pub fn position_for(&self, candidate: u64) -> Result<u32> {
        compute_position(candidate, &self.bids)
    }

    pub fn range(&self) -> BidRange {
        bid_range_for_target(&self.bids)
    }

    /// Add a bid locally, keeping order. For what-if previews.
    pub fn insert(&mut self, bid: u64) {
        let pos = self.bids.partition_point(|&b| b < bid);
        self.bids.insert(pos, bid);
    }

    pub fn highest(&self) -> Option<u64> {
        self.bids.last().copied()
    }

    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.bids
    }
}

/// A post with its place in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedPost {
    pub rank: u32,
    pub key: RecordKey,
    pub post: PostRecord,
}

/// Feed order: bid descending, then earlier ledger timestamp, then post
/// key bytes. Total and deterministic, so every client renders the same
/// feed.
pub fn rank_posts(mut posts: Vec<(RecordKey, PostRecord)>) -> Vec<RankedPost> {
    posts.sort_by(|(ka, a), (kb, b)| {
        b.bid_lamports
            .cmp(&a.bid_lamports)
            .then(a.timestamp.cmp(&b.timestamp))
            .then(ka.cmp(kb))
    });
    posts
        .into_iter()
        .enumerate()
        .map(|(i, (key, post))| RankedPost {
            rank: i as u32 + 1,
            key,
            post,
        })
        .collect()
}
