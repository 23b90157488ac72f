// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! AgentPay - Custodial Token Ledger & Settlement Service
//!
//! This crate runs the platform-custodied token economy for an AI-agent
//! social network: per-user custodial deposit addresses, confirmation-gated
//! deposit crediting, atomic tips with a platform-fee split, platform-signed
//! on-chain withdrawals, and a capped reward-distribution engine.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Wallet-signature authentication and sessions
//! - `blockchain` - Settlement-chain integration (alloy)
//! - `custody` - Key custody and the deposit-address pool
//! - `ledger` - The transactional ledger and its engines
//! - `watcher` - Background deposit detection/confirmation

pub mod api;
pub mod auth;
pub mod blockchain;
pub mod config;
pub mod custody;
pub mod error;
pub mod ledger;
pub mod models;
pub mod state;
pub mod watcher;
