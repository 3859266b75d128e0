//! # Protocol Configuration & Constants
//!
//! Every magic number in shadowpost lives here. Two kinds of values:
//!
//! - **Protocol constants**: compiled in, never runtime-settable. Minimum
//!   bid, fee rates, record size limits, derivation domain tags. Other
//!   clients parse our records, so changing any of these is a wire break.
//! - **[`ClientConfig`]**: timing and retry knobs for the async flows.
//!   Safe to tune per deployment; nothing consensus-relevant in there.
//!
//! Revenue recipients are deliberately NOT here. They live as `const` keys in
//! [`crate::revenue`] and there is no code path that accepts them as input.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, ShadowError};

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Lamports per SOL. Every amount in this crate is a `u64` of lamports.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// Bidding
// ---------------------------------------------------------------------------

/// Smallest bid the protocol accepts (0.001 SOL). Anything lower is rejected
/// locally with `BidTooLow` and again by the ledger.
pub const MIN_BID_LAMPORTS: u64 = 1_000_000;

/// Upper bound of the bid slider when a target has no posts yet (1 SOL).
pub const DEFAULT_BID_CEILING_LAMPORTS: u64 = LAMPORTS_PER_SOL;

/// Headroom above the current top bid offered by the bid slider (1 SOL).
pub const BID_RANGE_HEADROOM_LAMPORTS: u64 = LAMPORTS_PER_SOL;

/// Platform fee charged on top of the bid, in basis points (10%).
pub const PLATFORM_FEE_BPS: u64 = 1_000;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Revenue split percentages: primary treasury, community pool, operations.
/// Must sum to 100.
pub const REVENUE_SPLIT_PERCENT: [u64; 3] = [45, 10, 45];

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Network fee charged per transaction signature.
pub const NETWORK_FEE_LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Default buffer kept on a shadow identity on top of bid + platform fee
/// (0.01 SOL). Covers network fees for the post and a few follow-ups.
pub const DEFAULT_FEE_BUFFER_LAMPORTS: u64 = 10_000_000;

/// Number of recent blockhashes a transaction may reference before it is
/// considered expired.
pub const BLOCKHASH_VALIDITY_SLOTS: usize = 150;

// ---------------------------------------------------------------------------
// Record Limits
// ---------------------------------------------------------------------------

/// Maximum post content length in bytes (UTF-8).
pub const MAX_CONTENT_LENGTH: usize = 512;

/// Maximum target handle length in bytes after normalization.
pub const MAX_HANDLE_LENGTH: usize = 64;

/// Maximum direct-message plaintext length in bytes.
pub const MAX_MESSAGE_LENGTH: usize = 1024;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 signature length. The master secret is one of these.
pub const SIGNATURE_LENGTH: usize = 64;

/// Ed25519 / X25519 key length in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of the hashed off-chain user id mixed into derivation.
pub const HASHED_USER_ID_LENGTH: usize = 32;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// The fixed challenge the primary wallet signs to unlock a session.
///
/// Changing a single byte here changes every derived shadow identity for
/// every user. Don't.
pub const MASTER_CHALLENGE_MESSAGE: &str =
    "shadowpost: sign to unlock your shadow identities.\n\nThis signature never leaves this device and costs nothing.";

/// Domain tag separating messaging keys from signing keys.
pub const MESSAGING_KEY_DOMAIN: &[u8] = b"msg-v1";

/// BLAKE3 `derive_key` context for direct-message content keys.
pub const CONTENT_KEY_CONTEXT: &str = "shadowpost 2026-01 dm content key v1";

/// BLAKE3 `derive_key` context for sealed identity envelopes.
pub const IDENTITY_ENVELOPE_CONTEXT: &str = "shadowpost 2026-01 dm identity envelope v1";

/// Associated data bound to every direct-message ciphertext.
pub const CONTENT_AAD: &[u8] = b"shadowpost-dm-v1";

// ---------------------------------------------------------------------------
// Timing Defaults
// ---------------------------------------------------------------------------

/// How long to wait for a funding transfer to confirm before reporting it
/// as still pending.
pub const FUNDING_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// How long to wait for a post transaction to confirm per attempt.
pub const TX_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between confirmation status polls.
pub const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Attempts for transient ledger failures before giving up.
pub const MAX_SUBMIT_ATTEMPTS: u32 = 4;

/// First backoff delay; doubles on each retry.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Runtime knobs for the asynchronous flows.
///
/// Everything defaults to the constants above. Load overrides from JSON with
/// [`ClientConfig::from_json_str`]; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Extra lamports kept on a shadow identity beyond bid + platform fee.
    pub fee_buffer_lamports: u64,
    /// Funding confirmation window in milliseconds.
    pub funding_timeout_ms: u64,
    /// Post confirmation window per attempt, in milliseconds.
    pub confirm_timeout_ms: u64,
    /// Confirmation poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum attempts for transient failures.
    pub max_attempts: u32,
    /// Base retry delay in milliseconds.
    pub retry_base_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            fee_buffer_lamports: DEFAULT_FEE_BUFFER_LAMPORTS,
            funding_timeout_ms: FUNDING_CONFIRM_TIMEOUT.as_millis() as u64,
            confirm_timeout_ms: TX_CONFIRM_TIMEOUT.as_millis() as u64,
            poll_interval_ms: CONFIRM_POLL_INTERVAL.as_millis() as u64,
            max_attempts: MAX_SUBMIT_ATTEMPTS,
            retry_base_delay_ms: RETRY_BASE_DELAY.as_millis() as u64,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document, falling back to defaults for absent fields,
    /// then validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ShadowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the flows spin or never wait.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ShadowError::Config("max_attempts must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ShadowError::Config("poll_interval_ms must be positive".into()));
        }
        if self.poll_interval_ms > self.confirm_timeout_ms
            || self.poll_interval_ms > self.funding_timeout_ms
        {
            return Err(ShadowError::Config(
                "poll_interval_ms must not exceed the confirmation windows".into(),
            ));
        }
        Ok(())
    }

    pub fn funding_timeout(&self) -> Duration {
        Duration::from_millis(self.funding_timeout_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revenue_percentages_sum_to_one_hundred() {
        assert_eq!(REVENUE_SPLIT_PERCENT.iter().sum::<u64>(), 100);
    }

    #[test]
    fn min_bid_below_default_ceiling() {
        assert!(MIN_BID_LAMPORTS < DEFAULT_BID_CEILING_LAMPORTS);
        assert!(PLATFORM_FEE_BPS < BPS_DENOMINATOR);
    }

    #[test]
    fn default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fee_buffer_lamports, 10_000_000);
        assert_eq!(config.funding_timeout(), FUNDING_CONFIRM_TIMEOUT);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ClientConfig::from_json_str(r#"{ "max_attempts": 2 }"#).unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.fee_buffer_lamports, DEFAULT_FEE_BUFFER_LAMPORTS);
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = ClientConfig::from_json_str(r#"{ "max_attempts": 0 }"#).unwrap_err();
        assert!(matches!(err, ShadowError::Config(_)));
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            ClientConfig::from_json_str("{ nope"),
            Err(ShadowError::Config(_))
        ));
    }

    #[test]
    fn challenge_message_is_stable() {
        // Derivation depends on these exact bytes.
        assert!(MASTER_CHALLENGE_MESSAGE.starts_with("shadowpost:"));
        assert_eq!(MESSAGING_KEY_DOMAIN, b"msg-v1");
    }
}
