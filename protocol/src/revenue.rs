//! # Revenue Split
//!
//! The platform fee on every post goes to three fixed accounts:
//!
//! | Recipient   | Share |
//! |-------------|-------|
//! | primary     | 45%   |
//! | community   | 10%   |
//! | operations  | 45%   |
//!
//! Integer lamports only. The first two shares are floored and the third
//! takes whatever is left, so the three always sum to exactly the input.
//! A 1-lamport fee goes entirely to operations.
//!
//! Recipients are compiled in. There is no constructor that takes them as
//! input, so a compromised config file can't redirect fees.

use serde::{Deserialize, Serialize};

use crate::config::{BPS_DENOMINATOR, PLATFORM_FEE_BPS, REVENUE_SPLIT_PERCENT};
use crate::crypto::ShadowPublicKey;

pub const PRIMARY_TREASURY: ShadowPublicKey = ShadowPublicKey::from_bytes([
    0x0b, 0x6a, 0x2c, 0x9e, 0x51, 0x3f, 0xd4, 0x87, 0x20, 0xc1, 0x5e, 0x93, 0x7a, 0x08, 0xbf, 0x46,
    0xe2, 0x19, 0x74, 0xad, 0x3b, 0x60, 0xf5, 0x8c, 0x12, 0xd7, 0x4e, 0xa9, 0x35, 0x6b, 0xc0, 0x01,
]);

pub const COMMUNITY_POOL: ShadowPublicKey = ShadowPublicKey::from_bytes([
    0x7c, 0x04, 0xe8, 0x33, 0x9a, 0xb1, 0x26, 0x5d, 0xf0, 0x48, 0x8e, 0x17, 0xc5, 0x62, 0x0d, 0xaa,
    0x39, 0xd2, 0x81, 0x5f, 0xe6, 0x14, 0x7b, 0xc8, 0x03, 0x9f, 0x56, 0x2e, 0xb4, 0x71, 0x0a, 0x02,
]);

pub const OPERATIONS: ShadowPublicKey = ShadowPublicKey::from_bytes([
    0xd1, 0x58, 0x0e, 0x7f, 0x24, 0xc9, 0x63, 0xb0, 0x4a, 0x95, 0x1c, 0xe7, 0x30, 0x8b, 0x52, 0xfd,
    0x66, 0x0c, 0xa3, 0x49, 0x97, 0x2d, 0xe1, 0x38, 0x5a, 0xb6, 0x07, 0xcf, 0x84, 0x1e, 0x6d, 0x03,
]);

/// Platform fee charged on top of a bid: `bid * 1000 / 10000` (10%).
pub fn platform_fee(bid_lamports: u64) -> u64 {
    (bid_lamports as u128 * PLATFORM_FEE_BPS as u128 / BPS_DENOMINATOR as u128) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueSplit {
    pub primary: u64,
    pub community: u64,
    pub operations: u64,
}

impl RevenueSplit {
    pub fn total(&self) -> u64 {
        self.primary + self.community + self.operations
    }

    /// `(recipient, lamports)` in fixed order: primary, community,
    /// operations. Includes zero shares; callers skip those.
    pub fn transfers(&self) -> [(ShadowPublicKey, u64); 3] {
        [
            (PRIMARY_TREASURY, self.primary),
            (COMMUNITY_POOL, self.community),
            (OPERATIONS, self.operations),
        ]
    }
}

pub fn split_revenue(total: u64) -> RevenueSplit {
    let share = |percent: u64| (total as u128 * percent as u128 / 100) as u64;
    let primary = share(REVENUE_SPLIT_PERCENT[0]);
    let community = share(REVENUE_SPLIT_PERCENT[1]);
    RevenueSplit {
        primary,
        community,
        operations: total - primary - community,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_sum_exactly() {
        for total in [0, 1, 2, 9, 10, 99, 100, 101, 1_000_003, 123_456_789, u64::MAX] {
            let split = split_revenue(total);
            assert_eq!(
                split.primary as u128 + split.community as u128 + split.operations as u128,
                total as u128,
                "total {}",
                total
            );
        }
    }

    #[test]
    fn remainder_goes_to_operations() {
        assert_eq!(
            split_revenue(1),
            RevenueSplit {
                primary: 0,
                community: 0,
                operations: 1
            }
        );
        assert_eq!(
            split_revenue(100),
            RevenueSplit {
                primary: 45,
                community: 10,
                operations: 45
            }
        );
        assert_eq!(
            split_revenue(101),
            RevenueSplit {
                primary: 45,
                community: 10,
                operations: 46
            }
        );
        // One SOL.
        assert_eq!(
            split_revenue(1_000_000_000),
            RevenueSplit {
                primary: 450_000_000,
                community: 100_000_000,
                operations: 450_000_000
            }
        );
    }

    #[test]
    fn fee_is_ten_percent() {
        assert_eq!(platform_fee(50_000_000), 5_000_000);
        assert_eq!(platform_fee(9), 0);
        assert_eq!(platform_fee(u64::MAX), u64::MAX / 10);
    }

    #[test]
    fn recipients_are_distinct() {
        let t = split_revenue(10).transfers();
        assert_ne!(t[0].0, t[1].0);
        assert_ne!(t[1].0, t[2].0);
        assert_ne!(t[0].0, t[2].0);
    }
}
