//! # Wallets
//!
//! The user's primary wallet signs exactly two kinds of things: the fixed
//! unlock challenge (once per session) and funding transfers to shadow
//! identities. Everything else is signed by re-derived shadow keys.

pub mod local;
pub mod provider;

pub use local::{LocalKeypairWallet, SignRequest};
pub use provider::{
    select_provider, WalletDescriptor, WalletKind, WalletProvider, FEATURE_SIGN_MESSAGE,
    FEATURE_SIGN_TRANSACTION,
};
