//! # Post Transaction Composer
//!
//! Turns "post this about @alice with a 0.05 SOL bid" into one confirmed
//! ledger transaction:
//!
//! 1. validate locally (bid floor, content length, target exists)
//! 2. check the shadow identity's balance against bid + fee + buffer
//! 3. if short, fund it from the primary wallet and wait for confirmation
//! 4. compose create-post + bid payment + fee split, sign with the shadow key
//! 5. submit, confirm, retry what is transient
//!
//! Only one transaction per shadow key is in flight at a time. Funding
//! is terminal on failure; a post that fails after funding leaves the
//! identity funded and the request retryable.

pub mod cancel;
pub(crate) mod confirm;
pub mod funding;
pub mod post;
pub mod retry;
pub mod state;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use funding::{funding_tag, FundingIntent};
pub use post::{
    PendingFunding, PostOutcome, PostPreview, PostReceipt, PostRequest, PostTransactionComposer,
};
pub use retry::RetryPolicy;
pub use state::{PostState, PostStateMachine, Transition};
