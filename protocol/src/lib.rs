// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # shadowpost: Core Library
//!
//! One wallet, many unlinkable voices. A user signs a fixed challenge once
//! and gets an unbounded family of shadow identities, each with its own
//! Ed25519 key and X25519 messaging key, none of them stored anywhere.
//! Identities post about public accounts with a bid that decides their
//! place in the feed, and talk to each other in messages that hide both
//! content and correspondents.
//!
//! ## Architecture
//!
//! - **crypto**: typed wrappers over ed25519-dalek, x25519-dalek, AES-GCM
//!   and the hash functions.
//! - **identity**: session, deterministic derivation, display names, the
//!   shadow wallet registry.
//! - **ranking**: where a bid lands, live, without touching the chain.
//! - **revenue**: the fixed three-way platform fee split.
//! - **composer**: funding, composing and confirming a post as one
//!   atomic transaction.
//! - **messaging**: two-layer private messages and key registration.
//! - **ledger**: record layouts, transactions and the client seam.
//! - **wallet**: the primary wallet seam and provider selection.
//! - **social**: the profile backend seam.
//! - **config**: protocol constants and the runtime client config.
//!
//! ## Ground rules
//!
//! 1. No secret touches disk. Keys are re-derived and dropped.
//! 2. Anything that moves lamports is one transaction or nothing.
//! 3. Protocol constants (minimum bid, fee split, recipients) are compiled
//!    in, not configured.

pub mod composer;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod messaging;
pub mod ranking;
pub mod revenue;
pub mod social;
pub mod wallet;

pub use error::{Result, ShadowError};
