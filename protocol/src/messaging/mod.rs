//! # Private Messaging
//!
//! Direct messages between shadow identities, stored on the public ledger
//! in two layers:
//!
//! - **envelope**: the content, encrypted under a key both parties derive
//!   from their X25519 messaging keys.
//! - **shield**: who sent it to whom, sealed so that only the two
//!   participants can tell from the record. The storing transaction is
//!   still signed by the sender.
//!
//! Each identity publishes its messaging public key once (`register`).
//! Sending to an identity that never registered fails before anything is
//! written.

pub mod envelope;
pub mod service;
pub mod shield;

pub use envelope::{open_content, seal_content, Party, SealedContent};
pub use service::{
    Contact, Direction, MessagingService, PrivateMessage, RegistrationOutcome, SentMessage,
};
pub use shield::{MetadataShield, Participants, SealedPairShield, ENVELOPE_LEN, IDENTITY_BLOB_LEN};
