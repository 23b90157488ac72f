// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Platform key custody.
//!
//! - `keys` — keypair generation and AEAD sealing of private keys at rest
//! - `pool` — permanent, idempotent deposit-address assignment

pub mod keys;
pub mod pool;

pub use keys::{CustodyError, GeneratedAddress, KeyCustody};
pub use pool::{DepositAddressPool, PoolError};
