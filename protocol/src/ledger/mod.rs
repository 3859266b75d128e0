//! # Ledger
//!
//! Record layouts, transactions, and the [`LedgerClient`] seam the rest of
//! the crate talks through.
//!
//! - **records**: bit-exact post, registration and message layouts plus
//!   the addressing scheme (record keys, bid vaults).
//! - **transaction**: instructions, canonical signable bytes, builder.
//! - **client**: the async trait and the rejection taxonomy.
//! - **memory**: the in-process ledger used by tests and the simulator.

pub mod client;
pub mod memory;
pub mod records;
pub mod transaction;

pub use client::{
    posts_for_target, registration_for, ConfirmationStatus, LedgerClient, LedgerRejection,
};
pub use memory::InMemoryLedger;
pub use records::{
    bid_vault_address, message_key, post_key, registration_key, MessageRecord, Platform,
    PostRecord, RecordKey, RecordKind, RegistrationRecord, TargetDescriptor,
};
pub use transaction::{
    Blockhash, Instruction, LedgerTransaction, SignatureEntry, TransactionBuilder,
    TransactionMessage, TxSignature,
};
