//! The social backend seam.
//!
//! The profile service is someone else's system. The core asks it three
//! questions and nothing more: what is this key's display name, is it
//! premium, and does this target account exist.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use crate::crypto::ShadowPublicKey;
use crate::error::Result;
use crate::ledger::TargetDescriptor;

#[async_trait]
pub trait SocialBackend: Send + Sync {
    /// Profile name chosen by the user, if any.
    async fn display_name(&self, key: &ShadowPublicKey) -> Result<Option<String>>;

    async fn is_premium(&self, key: &ShadowPublicKey) -> Result<bool>;

    async fn target_exists(&self, target: &TargetDescriptor) -> Result<bool>;
}

/// Backend held in memory. Targets must be added before they "exist".
#[derive(Debug, Default)]
pub struct InMemorySocialBackend {
    names: DashMap<ShadowPublicKey, String>,
    premium: DashSet<ShadowPublicKey>,
    targets: DashSet<TargetDescriptor>,
}

impl InMemorySocialBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets<I: IntoIterator<Item = TargetDescriptor>>(targets: I) -> Self {
        let backend = Self::new();
        for target in targets {
            backend.add_target(target);
        }
        backend
    }

    pub fn add_target(&self, target: TargetDescriptor) {
        self.targets.insert(target);
    }

    pub fn set_display_name(&self, key: ShadowPublicKey, name: impl Into<String>) {
        self.names.insert(key, name.into());
    }

    pub fn set_premium(&self, key: ShadowPublicKey, premium: bool) {
        if premium {
            self.premium.insert(key);
        } else {
            self.premium.remove(&key);
        }
    }
}

#[async_trait]
impl SocialBackend for InMemorySocialBackend {
    async fn display_name(&self, key: &ShadowPublicKey) -> Result<Option<String>> {
        Ok(self.names.get(key).map(|entry| entry.value().clone()))
    }

    async fn is_premium(&self, key: &ShadowPublicKey) -> Result<bool> {
        Ok(self.premium.contains(key))
    }

    async fn target_exists(&self, target: &TargetDescriptor) -> Result<bool> {
        Ok(self.targets.contains(target))
    }
}
