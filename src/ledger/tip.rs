// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Tip settlement.
//!
//! Tips are internal transfers: no chain interaction, no pending state. The
//! engine validates the request, computes the platform-fee split, and hands
//! the precomputed amounts to the ledger's single settlement transaction.

use std::sync::Arc;

use alloy::primitives::U256;

use super::{fee_for, LedgerDb, LedgerError, LedgerResult};
use crate::models::Tip;

/// Settles tips with the configured platform cut.
pub struct TipEngine {
    ledger: Arc<LedgerDb>,
    fee_bps: u32,
}

impl TipEngine {
    pub fn new(ledger: Arc<LedgerDb>, fee_bps: u32) -> Self {
        Self { ledger, fee_bps }
    }

    /// Tip an agent for a post. Fails with `InvalidAmount` on zero and
    /// `InsufficientBalance` when the tipper cannot cover the amount; both
    /// are rejected before any state change.
    pub fn tip(
        &self,
        from_wallet: &str,
        to_agent: u64,
        post_ref: u64,
        amount: U256,
    ) -> LedgerResult<Tip> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }

        let platform_fee = fee_for(amount, self.fee_bps)?;
        self.ledger.settle_tip(
            &from_wallet.to_ascii_lowercase(),
            to_agent,
            post_ref,
            amount,
            platform_fee,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountId, Deposit, DepositStatus};
    use chrono::Utc;

    fn tokens(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
    }

    fn funded_engine(fee_bps: u32, balance: U256) -> (TipEngine, Arc<LedgerDb>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerDb::open(&dir.path().join("ledger.redb")).unwrap());
        ledger
            .record_pending_deposit(Deposit {
                tx_hash: "0xfund".to_string(),
                block_number: 1,
                deposit_address: "0xdead".to_string(),
                wallet_address: "0xaaaa000000000000000000000000000000000001".to_string(),
                amount: balance,
                status: DepositStatus::Pending,
                created_at: Utc::now(),
                confirmed_at: None,
            })
            .unwrap();
        ledger.confirm_deposit("0xfund").unwrap();
        (TipEngine::new(ledger.clone(), fee_bps), ledger, dir)
    }

    #[test]
    fn tip_splits_amount_at_configured_rate() {
        // The worked example: balance 1,000,000; tip 100,000 at 5%
        let wallet = "0xaaaa000000000000000000000000000000000001";
        let (engine, ledger, _dir) = funded_engine(500, tokens(1_000_000));

        let tip = engine.tip(wallet, 7, 42, tokens(100_000)).unwrap();
        assert_eq!(tip.platform_fee, tokens(5_000));
        assert_eq!(tip.agent_received, tokens(95_000));

        let user = ledger.account(&AccountId::user(wallet)).unwrap().unwrap();
        assert_eq!(user.balance, tokens(900_000));
        assert_eq!(user.total_tipped, tokens(100_000));

        let agent = ledger.account(&AccountId::agent(7)).unwrap().unwrap();
        assert_eq!(agent.balance, tokens(95_000));
    }

    #[test]
    fn zero_amount_is_rejected() {
        let (engine, _ledger, _dir) = funded_engine(500, tokens(10));
        let result = engine.tip("0xaaaa000000000000000000000000000000000001", 7, 1, U256::ZERO);
        assert!(matches!(result, Err(LedgerError::InvalidAmount)));
    }

    #[test]
    fn mixed_case_wallet_resolves_to_the_same_account() {
        let (engine, ledger, _dir) = funded_engine(0, tokens(10));
        engine
            .tip("0xAAAA000000000000000000000000000000000001", 7, 1, tokens(4))
            .unwrap();

        let user = ledger
            .account(&AccountId::user("0xaaaa000000000000000000000000000000000001"))
            .unwrap()
            .unwrap();
        assert_eq!(user.balance, tokens(6));
    }
}
