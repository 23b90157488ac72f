// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! The custodial ledger and its settlement engines.
//!
//! - `db` — the transactional store; every balance mutation commits together
//!   with its audit record
//! - `tip` — atomic user→agent transfers with a platform-fee split
//! - `withdraw` — withdrawal requests plus the background drain that signs
//!   and broadcasts on-chain transfers
//! - `rewards` — the capped reward-distribution engine

use alloy::primitives::U256;

pub mod db;
pub mod rewards;
pub mod tip;
pub mod withdraw;

pub use db::{GrantRequest, LedgerDb, LedgerError, LedgerResult};
pub use rewards::{default_reward_configs, PoolStats, RewardEngine};
pub use tip::TipEngine;
pub use withdraw::WithdrawalProcessor;

/// Basis points per whole.
pub const BPS_SCALE: u64 = 10_000;

/// Platform fee for an amount at a basis-point rate, in exact integer
/// arithmetic (sub-unit remainders round down).
pub fn fee_for(amount: U256, bps: u32) -> LedgerResult<U256> {
    let fee = amount
        .checked_mul(U256::from(bps))
        .ok_or(LedgerError::Overflow)?
        / U256::from(BPS_SCALE);
    Ok(fee)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_is_exact_at_500_bps() {
        // 5% of 100,000 tokens
        let amount = U256::from(100_000u64) * U256::from(10u64).pow(U256::from(18u64));
        let expected = U256::from(5_000u64) * U256::from(10u64).pow(U256::from(18u64));
        assert_eq!(fee_for(amount, 500).unwrap(), expected);
    }

    #[test]
    fn sub_unit_remainders_round_down() {
        assert_eq!(fee_for(U256::from(1u64), 500).unwrap(), U256::ZERO);
        assert_eq!(fee_for(U256::from(19u64), 500).unwrap(), U256::ZERO);
        assert_eq!(fee_for(U256::from(20u64), 500).unwrap(), U256::from(1u64));
    }

    #[test]
    fn zero_bps_means_no_fee() {
        assert_eq!(fee_for(U256::from(12_345u64), 0).unwrap(), U256::ZERO);
    }
}
