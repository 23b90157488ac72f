// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

use std::sync::Arc;

use crate::blockchain::TxBuilder;
use crate::config::AppConfig;
use crate::custody::{DepositAddressPool, KeyCustody};
use crate::ledger::{LedgerDb, RewardEngine, TipEngine, WithdrawalProcessor};

/// Shared application state handed to every handler.
///
/// Background tasks never share in-process mutable state with handlers; all
/// coordination goes through the ledger's transactions, so everything here is
/// an immutable `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub ledger: Arc<LedgerDb>,
    pub custody: Arc<KeyCustody>,
    pub address_pool: Arc<DepositAddressPool>,
    pub tips: Arc<TipEngine>,
    pub rewards: Arc<RewardEngine>,
    pub withdrawals: Arc<WithdrawalProcessor>,
}

impl AppState {
    /// Wire up engines over a shared ledger.
    pub fn new(config: AppConfig, ledger: Arc<LedgerDb>, tx_builder: Option<TxBuilder>) -> Self {
        let config = Arc::new(config);
        let custody = Arc::new(KeyCustody::new(&config.key_encryption_key));
        let address_pool = Arc::new(DepositAddressPool::new(ledger.clone(), custody.clone()));
        let tips = Arc::new(TipEngine::new(ledger.clone(), config.tip_fee_bps));
        let rewards = Arc::new(RewardEngine::new(
            ledger.clone(),
            config.reward_global_daily_cap,
            config.reward_pool_floor,
        ));
        let withdrawals = Arc::new(WithdrawalProcessor::new(
            ledger.clone(),
            tx_builder,
            config.withdraw_fee_bps,
            config.min_withdraw,
        ));

        Self {
            config,
            ledger,
            custody,
            address_pool,
            tips,
            rewards,
            withdrawals,
        }
    }
}
