// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! # Deposit Watcher
//!
//! Background task that detects inbound token transfers to custodial deposit
//! addresses and credits the ledger once they are confirmed.
//!
//! ## Strategy
//!
//! Every cycle, for each active assigned address, it queries the token
//! contract's `Transfer(address,address,uint256)` events with that address
//! as recipient over a trailing window of recent blocks. This is a sliding
//! window, not a persisted cursor: a missed cycle costs nothing, and
//! re-seeing an event is harmless because the deposit's tx hash is the
//! idempotency key.
//!
//! A sighted transfer becomes a `pending` deposit (transfers below the
//! minimum are ignored outright — by design they are never recorded).
//! Once `current_block - deposit_block` reaches the confirmation threshold
//! the deposit is promoted to `confirmed`, which credits the account in the
//! same transaction.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::rpc::types::Filter;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blockchain::{decode_transfer_log, ChainClient, ChainClientError, TransferEvent, TRANSFER_TOPIC};
use crate::ledger::{LedgerDb, LedgerError};
use crate::models::{CustodialAddress, Deposit, DepositStatus};

/// Default interval between poll cycles.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Trailing block window scanned each cycle.
const SCAN_WINDOW_BLOCKS: u64 = 1_000;

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainClientError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("invalid custodial address {0}")]
    InvalidAddress(String),
}

/// Deposit watcher that runs as a background tokio task.
pub struct DepositWatcher {
    ledger: Arc<LedgerDb>,
    chain: ChainClient,
    token_contract: Address,
    confirmations: u64,
    min_deposit: U256,
    poll_interval: Duration,
    scan_window: u64,
}

impl DepositWatcher {
    pub fn new(
        ledger: Arc<LedgerDb>,
        chain: ChainClient,
        token_contract: Address,
        confirmations: u64,
        min_deposit: U256,
    ) -> Self {
        Self {
            ledger,
            chain,
            token_contract,
            confirmations,
            min_deposit,
            poll_interval: DEFAULT_POLL_INTERVAL,
            scan_window: SCAN_WINDOW_BLOCKS,
        }
    }

    /// Run the watcher loop until the cancellation token is triggered.
    ///
    /// This should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(watcher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            token = %self.token_contract,
            confirmations = self.confirmations,
            interval_secs = self.poll_interval.as_secs(),
            "Deposit watcher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Deposit watcher shutting down");
                return;
            }

            if let Err(e) = self.poll_step().await {
                warn!(error = %e, "Deposit poll cycle failed, will retry");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Deposit watcher shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one poll cycle over all active assigned addresses.
    async fn poll_step(&self) -> Result<(), WatcherError> {
        let addresses = self.ledger.active_assigned_addresses()?;
        if addresses.is_empty() {
            return Ok(());
        }

        let current_block = self.chain.block_number().await?;

        for address in &addresses {
            if let Err(e) = self.scan_address(address, current_block).await {
                warn!(
                    address = %address.address,
                    error = %e,
                    "Deposit scan failed for address"
                );
            }
        }

        Ok(())
    }

    /// Scan the trailing block window for transfers into one address.
    async fn scan_address(
        &self,
        address: &CustodialAddress,
        current_block: u64,
    ) -> Result<(), WatcherError> {
        let to_addr: Address = address
            .address
            .parse()
            .map_err(|_| WatcherError::InvalidAddress(address.address.clone()))?;

        let from_block = current_block.saturating_sub(self.scan_window);

        let filter = Filter::new()
            .address(self.token_contract)
            .event_signature(TRANSFER_TOPIC)
            .topic2(to_addr.into_word())
            .from_block(from_block)
            .to_block(current_block);

        let logs = self.chain.logs(&filter).await?;

        for log in &logs {
            let Some(event) = decode_transfer_log(log) else {
                continue;
            };
            self.process_event(address, event, current_block)?;
        }

        Ok(())
    }

    /// Apply one sighted transfer to the ledger.
    fn process_event(
        &self,
        address: &CustodialAddress,
        event: TransferEvent,
        current_block: u64,
    ) -> Result<(), WatcherError> {
        // Already known: only a pending deposit can progress
        if let Some(existing) = self.ledger.deposit(&event.tx_hash)? {
            if existing.status == DepositStatus::Pending {
                let confirmations = current_block.saturating_sub(existing.block_number);
                if confirmations >= self.confirmations
                    && self.ledger.confirm_deposit(&event.tx_hash)?
                {
                    info!(
                        tx_hash = %event.tx_hash,
                        wallet = %existing.wallet_address,
                        amount = %existing.amount,
                        "Deposit confirmed and credited"
                    );
                }
            }
            return Ok(());
        }

        // Sub-minimum transfers are dropped without a record, by design
        if event.amount < self.min_deposit {
            debug!(
                tx_hash = %event.tx_hash,
                amount = %event.amount,
                "Ignoring transfer below minimum deposit"
            );
            return Ok(());
        }

        let Some(wallet) = address.assigned_to.clone() else {
            return Ok(());
        };

        let deposit = Deposit {
            tx_hash: event.tx_hash.clone(),
            block_number: event.block_number,
            deposit_address: address.address.clone(),
            wallet_address: wallet,
            amount: event.amount,
            status: DepositStatus::Pending,
            created_at: Utc::now(),
            confirmed_at: None,
        };

        if self.ledger.record_pending_deposit(deposit)? {
            info!(
                tx_hash = %event.tx_hash,
                address = %address.address,
                amount = %event.amount,
                "New deposit sighted"
            );
        }

        // Promote immediately when the event is already old enough
        let confirmations = current_block.saturating_sub(event.block_number);
        if confirmations >= self.confirmations && self.ledger.confirm_deposit(&event.tx_hash)? {
            info!(tx_hash = %event.tx_hash, "Deposit confirmed and credited");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountId;

    fn tokens(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
    }

    fn watcher(confirmations: u64) -> (DepositWatcher, Arc<LedgerDb>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerDb::open(&dir.path().join("ledger.redb")).unwrap());
        let chain = ChainClient::new("http://localhost:8545").unwrap();
        let token = "0x1111111111111111111111111111111111111111"
            .parse()
            .unwrap();
        let watcher = DepositWatcher::new(ledger.clone(), chain, token, confirmations, tokens(1));
        (watcher, ledger, dir)
    }

    fn custodial(wallet: Option<&str>) -> CustodialAddress {
        CustodialAddress {
            address: "0xdddd000000000000000000000000000000000001".to_string(),
            encrypted_private_key: "00".to_string(),
            assigned_to: wallet.map(|w| w.to_string()),
            is_active: true,
            created_at: Utc::now(),
            assigned_at: None,
        }
    }

    fn transfer(tx_hash: &str, block_number: u64, amount: U256) -> TransferEvent {
        TransferEvent {
            tx_hash: tx_hash.to_string(),
            block_number,
            from: "0xeeee000000000000000000000000000000000001".to_string(),
            to: "0xdddd000000000000000000000000000000000001".to_string(),
            amount,
        }
    }

    #[test]
    fn sighting_then_confirmation_credits_once() {
        let (watcher, ledger, _dir) = watcher(12);
        let address = custodial(Some("0xaaaa000000000000000000000000000000000001"));
        let wallet = AccountId::user("0xaaaa000000000000000000000000000000000001");

        // Sighted at depth 2: pending, not credited
        watcher
            .process_event(&address, transfer("0xtx1", 100, tokens(5)), 102)
            .unwrap();
        let deposit = ledger.deposit("0xtx1").unwrap().unwrap();
        assert_eq!(deposit.status, DepositStatus::Pending);
        assert!(ledger.account(&wallet).unwrap().is_none());

        // Re-seen at depth 12: confirmed and credited
        watcher
            .process_event(&address, transfer("0xtx1", 100, tokens(5)), 112)
            .unwrap();
        let deposit = ledger.deposit("0xtx1").unwrap().unwrap();
        assert_eq!(deposit.status, DepositStatus::Confirmed);
        assert_eq!(ledger.account(&wallet).unwrap().unwrap().balance, tokens(5));

        // Replaying the same event after confirmation is a no-op
        watcher
            .process_event(&address, transfer("0xtx1", 100, tokens(5)), 130)
            .unwrap();
        assert_eq!(ledger.account(&wallet).unwrap().unwrap().balance, tokens(5));
        assert_eq!(
            ledger.account(&wallet).unwrap().unwrap().total_deposited,
            tokens(5)
        );
    }

    #[test]
    fn deep_enough_event_is_credited_immediately() {
        let (watcher, ledger, _dir) = watcher(12);
        let address = custodial(Some("0xaaaa000000000000000000000000000000000001"));

        watcher
            .process_event(&address, transfer("0xtx1", 100, tokens(5)), 500)
            .unwrap();

        let deposit = ledger.deposit("0xtx1").unwrap().unwrap();
        assert_eq!(deposit.status, DepositStatus::Confirmed);
    }

    #[test]
    fn sub_minimum_transfers_leave_no_record() {
        let (watcher, ledger, _dir) = watcher(0);
        let address = custodial(Some("0xaaaa000000000000000000000000000000000001"));

        // Half a token, below the 1-token minimum
        let half = tokens(1) / U256::from(2u64);
        watcher
            .process_event(&address, transfer("0xtx1", 100, half), 500)
            .unwrap();

        assert!(ledger.deposit("0xtx1").unwrap().is_none());
        assert!(ledger
            .account(&AccountId::user("0xaaaa000000000000000000000000000000000001"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn unassigned_address_events_are_skipped() {
        let (watcher, ledger, _dir) = watcher(0);
        let address = custodial(None);

        watcher
            .process_event(&address, transfer("0xtx1", 100, tokens(5)), 500)
            .unwrap();
        assert!(ledger.deposit("0xtx1").unwrap().is_none());
    }
}
