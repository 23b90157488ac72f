// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Withdrawal requests and the background drain.
//!
//! Requests lock funds synchronously; a background task drains the pending
//! queue oldest-first, signs an ERC-20 transfer from the platform hot
//! wallet, and reconciles the ledger on success or failure. The status-gated
//! `pending → processing` transition stops a withdrawal from ever being
//! broadcast twice by overlapping passes.
//!
//! ## Known gap
//!
//! A crash after a successful broadcast but before `completed` is recorded
//! leaves the withdrawal in `processing` with the funds both sent and still
//! locked. There is no safe automatic recovery (rebroadcast risks double
//! payment), so startup logs every stranded `processing` withdrawal for
//! manual reconciliation against on-chain history.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{fee_for, LedgerDb, LedgerError, LedgerResult};
use crate::blockchain::TxBuilder;
use crate::models::{AccountId, Withdrawal};

/// Default interval between drain sweeps.
const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(30);

/// Pending withdrawals claimed per sweep, oldest first.
const DRAIN_BATCH_SIZE: usize = 10;

/// Locks funds for withdrawal requests and drains the pending queue.
pub struct WithdrawalProcessor {
    ledger: Arc<LedgerDb>,
    /// `None` when no platform key is configured; requests still queue.
    tx_builder: Option<TxBuilder>,
    fee_bps: u32,
    min_withdraw: U256,
    drain_interval: Duration,
}

impl WithdrawalProcessor {
    pub fn new(
        ledger: Arc<LedgerDb>,
        tx_builder: Option<TxBuilder>,
        fee_bps: u32,
        min_withdraw: U256,
    ) -> Self {
        Self {
            ledger,
            tx_builder,
            fee_bps,
            min_withdraw,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
        }
    }

    /// Create a withdrawal request, locking the gross amount.
    ///
    /// `BelowMinimum` and `InsufficientBalance` are rejected before any state
    /// change; on success the amount has moved to `locked_balance` and the
    /// request sits in the pending queue.
    pub fn request(
        &self,
        account: AccountId,
        to_address: &str,
        amount: U256,
    ) -> LedgerResult<Withdrawal> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        if amount < self.min_withdraw {
            return Err(LedgerError::BelowMinimum);
        }

        let fee = fee_for(amount, self.fee_bps)?;
        self.ledger.request_withdrawal(account, to_address, amount, fee)
    }

    /// Log withdrawals stranded in `processing` by a previous crash. They
    /// are left untouched; resolving them needs a human with the on-chain
    /// transaction history.
    pub fn log_stranded(&self) {
        match self.ledger.processing_withdrawals() {
            Ok(stranded) => {
                for w in stranded {
                    warn!(
                        withdrawal_id = w.id,
                        account = %w.account,
                        amount = %w.amount,
                        "Withdrawal stranded in processing state, requires manual reconciliation"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Failed to scan for stranded withdrawals"),
        }
    }

    /// Run the drain loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(processor.clone().run(shutdown.clone()));
    /// ```
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_secs = self.drain_interval.as_secs(),
            signing_enabled = self.tx_builder.is_some(),
            "Withdrawal processor starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Withdrawal processor shutting down");
                return;
            }

            self.drain_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.drain_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Withdrawal processor shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one drain sweep over the oldest pending withdrawals.
    pub async fn drain_once(&self) {
        let Some(tx_builder) = &self.tx_builder else {
            // No platform key configured; leave the queue untouched
            return;
        };

        let pending = match self.ledger.pending_withdrawals(DRAIN_BATCH_SIZE) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to list pending withdrawals");
                return;
            }
        };

        for withdrawal in pending {
            self.process_one(tx_builder, withdrawal.id).await;
        }
    }

    /// Claim and settle a single withdrawal.
    async fn process_one(&self, tx_builder: &TxBuilder, id: u64) {
        // Status gate: only a pending withdrawal can be claimed
        let withdrawal = match self.ledger.begin_withdrawal_processing(id) {
            Ok(Some(w)) => w,
            Ok(None) => return,
            Err(e) => {
                warn!(withdrawal_id = id, error = %e, "Failed to claim withdrawal");
                return;
            }
        };

        info!(
            withdrawal_id = id,
            to = %withdrawal.to_address,
            net_amount = %withdrawal.net_amount,
            "Broadcasting withdrawal"
        );

        // The broadcast is a blocking external call; no ledger transaction
        // is open across it
        match tx_builder
            .send_token_transfer(&withdrawal.to_address, withdrawal.net_amount)
            .await
        {
            Ok(tx_hash) => match self.ledger.complete_withdrawal(id, &tx_hash) {
                Ok(_) => info!(withdrawal_id = id, tx_hash = %tx_hash, "Withdrawal completed"),
                Err(e) => warn!(
                    withdrawal_id = id,
                    tx_hash = %tx_hash,
                    error = %e,
                    "Broadcast succeeded but completion could not be recorded"
                ),
            },
            Err(e) => {
                let reason = e.to_string();
                match self.ledger.fail_withdrawal(id, &reason) {
                    Ok(_) => warn!(withdrawal_id = id, reason = %reason, "Withdrawal failed, funds returned"),
                    Err(e) => warn!(
                        withdrawal_id = id,
                        error = %e,
                        "Failed to roll back failed withdrawal"
                    ),
                }
            }
        }
    }
}
