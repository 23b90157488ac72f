// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Deposit-address pool.
//!
//! Every wallet identity gets exactly one custodial deposit address, assigned
//! on first request and never revoked or reassigned. Assignment is idempotent
//! under concurrency: the ledger's single-writer transaction decides the
//! winner, and a losing request observes the winner's assignment (its
//! pre-minted candidate key is discarded, never persisted).

use std::sync::Arc;

use chrono::Utc;

use super::keys::{CustodyError, KeyCustody};
use crate::ledger::{LedgerDb, LedgerError};
use crate::models::CustodialAddress;

/// Deposit-address pool errors.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Assigns custodial deposit addresses to wallet identities.
pub struct DepositAddressPool {
    ledger: Arc<LedgerDb>,
    custody: Arc<KeyCustody>,
}

impl DepositAddressPool {
    pub fn new(ledger: Arc<LedgerDb>, custody: Arc<KeyCustody>) -> Self {
        Self { ledger, custody }
    }

    /// Get the address assigned to this wallet, assigning one if needed.
    pub fn get_or_create(&self, wallet_address: &str) -> Result<CustodialAddress, PoolError> {
        let wallet = wallet_address.to_ascii_lowercase();

        if let Some(existing) = self.ledger.assigned_address(&wallet)? {
            return Ok(existing);
        }

        // Mint a candidate before entering the write transaction; key
        // generation must not hold the ledger's writer slot. If another
        // request wins the race the candidate is dropped unused.
        let minted = self.custody.generate()?;
        let candidate = CustodialAddress {
            address: minted.address,
            encrypted_private_key: minted.encrypted_private_key,
            assigned_to: None,
            is_active: true,
            created_at: Utc::now(),
            assigned_at: None,
        };

        Ok(self.ledger.assign_deposit_address(&wallet, candidate)?)
    }
}
