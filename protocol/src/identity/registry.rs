//! # Shadow Wallet Registry
//!
//! The session's list of shadow identities, which one is active, and the
//! last balance seen for each.
//!
//! Nothing here is authoritative. Identities are re-derivable from the
//! session, balances come from the ledger, profile names from the social
//! backend. The registry is a cache with an index counter.
//!
//! ## Concurrency
//!
//! Every method takes `&self`. The identity list sits behind a
//! `parking_lot::RwLock` that is never held across an `.await`; balances
//! live in a `DashMap` so a balance refresh running in the background never
//! blocks a `select` or a post.

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::naming::display_name;
use super::session::Session;
use crate::composer::RetryPolicy;
use crate::crypto::ShadowPublicKey;
use crate::error::{Result, ShadowError};
use crate::ledger::LedgerClient;
use crate::social::SocialBackend;

/// One shadow identity as the UI sees it. Holds no secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowIdentity {
    pub index: u32,
    pub public_key: ShadowPublicKey,
    /// Derived from the public key; see [`super::naming`].
    pub display_name: String,
    /// Name set on the social backend, if any.
    pub profile_name: Option<String>,
    /// Last balance seen, not a live value.
    pub balance_lamports: u64,
    pub premium: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Sorted by index.
    identities: Vec<ShadowIdentity>,
    active: Option<u32>,
    /// High-water mark. Destroyed indices are not handed out again.
    next_index: u64,
}

pub struct ShadowWalletRegistry {
    ledger: Arc<dyn LedgerClient>,
    social: Arc<dyn SocialBackend>,
    state: RwLock<RegistryState>,
    balances: DashMap<ShadowPublicKey, u64>,
    retry: RetryPolicy,
}

impl ShadowWalletRegistry {
    pub fn new(ledger: Arc<dyn LedgerClient>, social: Arc<dyn SocialBackend>) -> Self {
        Self::with_retry(ledger, social, RetryPolicy::default())
    }

    pub fn with_retry(
        ledger: Arc<dyn LedgerClient>,
        social: Arc<dyn SocialBackend>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            social,
            state: RwLock::new(RegistryState::default()),
            balances: DashMap::new(),
            retry,
        }
    }

    /// Derive the next unused index and add it to the list. The first
    /// identity becomes active.
    ///
    /// Fails with `InvalidInput` once every `u32` index above the
    /// high-water mark is taken.
    pub fn generate_next(&self, session: &Session) -> Result<ShadowIdentity> {
        loop {
            let index = Self::next_free(&self.state.read())?;
            let identity = self.build_identity(session, index)?;

            let mut state = self.state.write();
            // Another caller may have raced us to the same index.
            if state.identities.iter().any(|i| i.index == index) {
                continue;
            }
            state.next_index = u64::from(index) + 1;
            Self::insert_sorted(&mut state, identity.clone());
            info!(index, identity = %identity.public_key, "shadow identity generated");
            return Ok(identity);
        }
    }

    fn next_free(state: &RegistryState) -> Result<u32> {
        let mut candidate = state.next_index;
        loop {
            let index = u32::try_from(candidate)
                .map_err(|_| ShadowError::InvalidInput("shadow identity index space exhausted".into()))?;
            if !state.identities.iter().any(|i| i.index == index) {
                return Ok(index);
            }
            candidate += 1;
        }
    }

    /// Bring back a specific index, e.g. after a reload. Returns the
    /// existing entry if already listed.
    pub fn restore(&self, session: &Session, index: u32) -> Result<ShadowIdentity> {
        if let Ok(existing) = self.get(index) {
            return Ok(existing);
        }
        let identity = self.build_identity(session, index)?;
        let mut state = self.state.write();
        if !state.identities.iter().any(|i| i.index == index) {
            state.next_index = state.next_index.max(u64::from(index) + 1);
            Self::insert_sorted(&mut state, identity.clone());
            debug!(index, "shadow identity restored");
        }
        Ok(identity)
    }

    /// Switch the active identity. No I/O.
    pub fn select(&self, index: u32) -> Result<()> {
        let mut state = self.state.write();
        if !state.identities.iter().any(|i| i.index == index) {
            return Err(ShadowError::UnknownIdentity(index));
        }
        state.active = Some(index);
        Ok(())
    }

    /// Remove from the session list only. The keys still exist, and
    /// `restore` brings them back.
    pub fn destroy(&self, index: u32) -> Result<ShadowIdentity> {
        let mut state = self.state.write();
        let pos = state
            .identities
            .iter()
            .position(|i| i.index == index)
            .ok_or(ShadowError::UnknownIdentity(index))?;
        let removed = state.identities.remove(pos);
        if state.active == Some(index) {
            state.active = state.identities.first().map(|i| i.index);
        }
        drop(state);
        self.balances.remove(&removed.public_key);
        info!(index, "shadow identity removed from session");
        Ok(removed)
    }

    pub fn active(&self) -> Option<ShadowIdentity> {
        let state = self.state.read();
        let index = state.active?;
        state
            .identities
            .iter()
            .find(|i| i.index == index)
            .map(|i| self.with_balance(i.clone()))
    }

    pub fn get(&self, index: u32) -> Result<ShadowIdentity> {
        self.state
            .read()
            .identities
            .iter()
            .find(|i| i.index == index)
            .map(|i| self.with_balance(i.clone()))
            .ok_or(ShadowError::UnknownIdentity(index))
    }

    pub fn identities(&self) -> Vec<ShadowIdentity> {
        self.state
            .read()
            .identities
            .iter()
            .map(|i| self.with_balance(i.clone()))
            .collect()
    }

    pub fn cached_balance(&self, key: &ShadowPublicKey) -> Option<u64> {
        self.balances.get(key).map(|b| *b)
    }

    pub fn set_cached_balance(&self, key: ShadowPublicKey, lamports: u64) {
        self.balances.insert(key, lamports);
    }

    /// Read every listed identity's balance concurrently.
    ///
    /// Balances are advisory: a read that still fails after retries is
    /// logged and left out of the result, and the cached value is kept.
    pub async fn refresh_balances(&self) -> HashMap<ShadowPublicKey, u64> {
        let keys: Vec<ShadowPublicKey> = self
            .state
            .read()
            .identities
            .iter()
            .map(|i| i.public_key)
            .collect();

        let reads = keys.iter().map(|key| async move {
            let result = self
                .retry
                .run("get_balance", || self.ledger.get_balance(key))
                .await;
            (*key, result)
        });

        let mut fresh = HashMap::with_capacity(keys.len());
        for (key, result) in join_all(reads).await {
            match result {
                Ok(lamports) => {
                    self.balances.insert(key, lamports);
                    fresh.insert(key, lamports);
                }
                Err(e) => warn!(identity = %key, error = %e, "balance refresh failed"),
            }
        }
        fresh
    }

    /// Pull profile names and premium flags from the social backend.
    /// Same failure policy as balances.
    pub async fn refresh_profiles(&self) {
        let keys: Vec<ShadowPublicKey> = self
            .state
            .read()
            .identities
            .iter()
            .map(|i| i.public_key)
            .collect();

        let lookups = keys.iter().map(|key| async move {
            let name = self.social.display_name(key).await;
            let premium = self.social.is_premium(key).await;
            (*key, name, premium)
        });

        for (key, name, premium) in join_all(lookups).await {
            let mut state = self.state.write();
            let Some(identity) = state.identities.iter_mut().find(|i| i.public_key == key) else {
                continue;
            };
            match name {
                Ok(name) => identity.profile_name = name,
                Err(e) => warn!(identity = %key, error = %e, "profile name lookup failed"),
            }
            match premium {
                Ok(premium) => identity.premium = premium,
                Err(e) => warn!(identity = %key, error = %e, "premium lookup failed"),
            }
        }
    }

    fn build_identity(&self, session: &Session, index: u32) -> Result<ShadowIdentity> {
        let public_key = session.signing_keypair(index)?.public_key();
        Ok(ShadowIdentity {
            index,
            public_key,
            display_name: display_name(&public_key),
            profile_name: None,
            balance_lamports: 0,
            premium: false,
        })
    }

    fn insert_sorted(state: &mut RegistryState, identity: ShadowIdentity) {
        let pos = state
            .identities
            .partition_point(|i| i.index < identity.index);
        if state.active.is_none() {
            state.active = Some(identity.index);
        }
        state.identities.insert(pos, identity);
    }

    fn with_balance(&self, mut identity: ShadowIdentity) -> ShadowIdentity {
        identity.balance_lamports = self.cached_balance(&identity.public_key).unwrap_or(0);
        identity
    }
}
