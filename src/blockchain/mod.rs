// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Settlement-chain integration.
//!
//! This module provides:
//! - A read-side chain client (block number, event logs, chain id)
//! - ERC-20 interface bindings and Transfer-event decoding
//! - Platform-wallet transaction building/broadcasting for withdrawals
//! - Exact base-unit amount parsing/formatting

pub mod client;
pub mod erc20;
pub mod transactions;

pub use client::{ChainClient, ChainClientError};
pub use erc20::{decode_transfer_log, transfer_calldata, TransferEvent, TRANSFER_TOPIC};
pub use transactions::{format_amount, parse_amount, TxBuilder, DEFAULT_GAS_LIMIT};
