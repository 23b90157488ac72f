// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Token-economy endpoints: deposit addresses, balances, tips, withdrawals,
//! and per-account history.
//!
//! Amounts cross the HTTP boundary as decimal strings and are converted to
//! base units exactly once, here.

use std::str::FromStr;

use alloy::primitives::{Address, U256};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::PageQuery;
use crate::auth::{AgentAuth, Auth};
use crate::blockchain::{format_amount, parse_amount};
use crate::error::ApiError;
use crate::models::{Account, AccountId, Deposit, RewardType, Withdrawal, TOKEN_DECIMALS};
use crate::state::AppState;

// =============================================================================
// Deposit address
// =============================================================================

/// The caller's custodial deposit address.
#[derive(Debug, Serialize, ToSchema)]
pub struct DepositAddressResponse {
    /// Send tokens here to credit the internal balance
    pub deposit_address: String,
    pub assigned_at: Option<DateTime<Utc>>,
}

/// Get (or assign) the caller's custodial deposit address.
#[utoipa::path(
    get,
    path = "/v1/token/deposit-address",
    tag = "Token",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Deposit address", body = DepositAddressResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn deposit_address(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<DepositAddressResponse>, ApiError> {
    let assigned = state.address_pool.get_or_create(&user.wallet)?;
    Ok(Json(DepositAddressResponse {
        deposit_address: assigned.address,
        assigned_at: assigned.assigned_at,
    }))
}

// =============================================================================
// Balances
// =============================================================================

/// Ledger balance snapshot.
#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<u64>,
    pub balance: String,
    pub locked_balance: String,
    pub total_deposited: String,
    pub total_withdrawn: String,
    pub total_tipped: String,
    pub total_received: String,
    pub total_rewards: String,
}

impl BalanceResponse {
    fn from_account(account: Account) -> Self {
        let (wallet_address, agent_id) = match &account.id {
            AccountId::User { wallet } => (Some(wallet.clone()), None),
            AccountId::Agent { id } => (None, Some(*id)),
        };
        Self {
            wallet_address,
            agent_id,
            balance: format_amount(account.balance, TOKEN_DECIMALS),
            locked_balance: format_amount(account.locked_balance, TOKEN_DECIMALS),
            total_deposited: format_amount(account.total_deposited, TOKEN_DECIMALS),
            total_withdrawn: format_amount(account.total_withdrawn, TOKEN_DECIMALS),
            total_tipped: format_amount(account.total_tipped, TOKEN_DECIMALS),
            total_received: format_amount(account.total_received, TOKEN_DECIMALS),
            total_rewards: format_amount(account.total_rewards, TOKEN_DECIMALS),
        }
    }
}

/// Get the caller's ledger balance. Never-credited wallets read as zero.
#[utoipa::path(
    get,
    path = "/v1/token/balance",
    tag = "Token",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Balance", body = BalanceResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn balance(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state
        .ledger
        .account_or_default(&AccountId::user(&user.wallet))?;
    Ok(Json(BalanceResponse::from_account(account)))
}

/// Get an agent's ledger balance.
#[utoipa::path(
    get,
    path = "/v1/agents/{agent_id}/balance",
    tag = "Agents",
    params(("agent_id" = u64, Path, description = "Agent id")),
    responses((status = 200, description = "Balance", body = BalanceResponse))
)]
pub async fn agent_balance(
    State(state): State<AppState>,
    Path(agent_id): Path<u64>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state
        .ledger
        .account_or_default(&AccountId::agent(agent_id))?;
    Ok(Json(BalanceResponse::from_account(account)))
}

// =============================================================================
// Tips
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct TipRequest {
    /// Agent being tipped
    pub agent_id: u64,
    /// Tip amount as a decimal string, avoiding client float precision loss
    pub amount: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TipResponse {
    pub tip_id: u64,
    pub amount: String,
    pub platform_fee: String,
    pub agent_received: String,
}

/// Tip an agent for a post.
///
/// Settles atomically; engagement rewards (tip-sent / tip-received) ride
/// along best-effort and their caps failing never fails the tip.
#[utoipa::path(
    post,
    path = "/v1/posts/{post_id}/tip",
    tag = "Token",
    params(("post_id" = u64, Path, description = "Post being tipped")),
    request_body = TipRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Tip settled", body = TipResponse),
        (status = 400, description = "Invalid amount or insufficient balance"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn tip_post(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(post_id): Path<u64>,
    Json(req): Json<TipRequest>,
) -> Result<Json<TipResponse>, ApiError> {
    let amount = parse_token_amount(&req.amount)?;

    let tip = state.tips.tip(&user.wallet, req.agent_id, post_id, amount)?;

    for (recipient, reward_type) in [
        (AccountId::user(&user.wallet), RewardType::TipSend),
        (AccountId::agent(req.agent_id), RewardType::TipReceive),
    ] {
        if let Err(e) = state
            .rewards
            .grant(recipient, reward_type, Some(("tip".to_string(), tip.id)))
        {
            tracing::debug!(reward_type = %reward_type, error = %e, "Engagement reward skipped");
        }
    }

    Ok(Json(TipResponse {
        tip_id: tip.id,
        amount: format_amount(tip.amount, TOKEN_DECIMALS),
        platform_fee: format_amount(tip.platform_fee, TOKEN_DECIMALS),
        agent_received: format_amount(tip.agent_received, TOKEN_DECIMALS),
    }))
}

// =============================================================================
// Withdrawals
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct WithdrawRequest {
    /// Amount as a decimal string
    pub amount: String,
    /// Destination address; defaults to the login wallet
    pub to_address: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AgentWithdrawRequest {
    pub amount: String,
    /// Destination address (required — agents have no login wallet)
    pub to_address: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawResponse {
    pub withdrawal_id: u64,
    pub amount: String,
    pub fee: String,
    pub net_amount: String,
    pub status: String,
}

impl WithdrawResponse {
    fn from_withdrawal(w: &Withdrawal) -> Self {
        Self {
            withdrawal_id: w.id,
            amount: format_amount(w.amount, TOKEN_DECIMALS),
            fee: format_amount(w.fee, TOKEN_DECIMALS),
            net_amount: format_amount(w.net_amount, TOKEN_DECIMALS),
            status: w.status.as_str().to_string(),
        }
    }
}

/// Request a withdrawal to an on-chain address. Funds lock immediately; the
/// background drain broadcasts the transfer.
#[utoipa::path(
    post,
    path = "/v1/token/withdraw",
    tag = "Token",
    request_body = WithdrawRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Withdrawal queued", body = WithdrawResponse),
        (status = 400, description = "Below minimum or insufficient balance"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn request_withdrawal(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let amount = parse_token_amount(&req.amount)?;
    let to_address = match req.to_address.as_deref() {
        Some(raw) => normalize_address(raw)?,
        None => user.wallet.clone(),
    };

    let withdrawal = state
        .withdrawals
        .request(AccountId::user(&user.wallet), &to_address, amount)?;

    Ok(Json(WithdrawResponse::from_withdrawal(&withdrawal)))
}

/// Request a withdrawal of an agent's balance.
#[utoipa::path(
    post,
    path = "/v1/agents/withdraw",
    tag = "Agents",
    request_body = AgentWithdrawRequest,
    responses(
        (status = 200, description = "Withdrawal queued", body = WithdrawResponse),
        (status = 400, description = "Below minimum or insufficient balance"),
        (status = 401, description = "Unknown agent key")
    )
)]
pub async fn agent_request_withdrawal(
    AgentAuth(agent_id): AgentAuth,
    State(state): State<AppState>,
    Json(req): Json<AgentWithdrawRequest>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let amount = parse_token_amount(&req.amount)?;
    let to_address = normalize_address(&req.to_address)?;

    let withdrawal = state
        .withdrawals
        .request(AccountId::agent(agent_id), &to_address, amount)?;

    Ok(Json(WithdrawResponse::from_withdrawal(&withdrawal)))
}

// =============================================================================
// History
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositItem {
    pub tx_hash: String,
    pub deposit_address: String,
    pub amount: String,
    pub status: String,
    pub block_number: u64,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl DepositItem {
    fn from_deposit(d: &Deposit) -> Self {
        Self {
            tx_hash: d.tx_hash.clone(),
            deposit_address: d.deposit_address.clone(),
            amount: format_amount(d.amount, TOKEN_DECIMALS),
            status: d.status.as_str().to_string(),
            block_number: d.block_number,
            created_at: d.created_at,
            confirmed_at: d.confirmed_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositHistoryResponse {
    pub deposits: Vec<DepositItem>,
    pub total: usize,
}

/// Deposit history for the caller's wallet, newest first.
#[utoipa::path(
    get,
    path = "/v1/token/deposits",
    tag = "Token",
    params(PageQuery),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Deposit history", body = DepositHistoryResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn deposit_history(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<DepositHistoryResponse>, ApiError> {
    let all = state.ledger.deposits_for_wallet(&user.wallet)?;
    let (limit, offset) = page.normalize();
    let deposits = all
        .iter()
        .skip(offset)
        .take(limit)
        .map(DepositItem::from_deposit)
        .collect();
    Ok(Json(DepositHistoryResponse {
        deposits,
        total: all.len(),
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawalItem {
    pub withdrawal_id: u64,
    pub to_address: String,
    pub amount: String,
    pub fee: String,
    pub net_amount: String,
    pub status: String,
    pub tx_hash: Option<String>,
    pub fail_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WithdrawalItem {
    fn from_withdrawal(w: &Withdrawal) -> Self {
        Self {
            withdrawal_id: w.id,
            to_address: w.to_address.clone(),
            amount: format_amount(w.amount, TOKEN_DECIMALS),
            fee: format_amount(w.fee, TOKEN_DECIMALS),
            net_amount: format_amount(w.net_amount, TOKEN_DECIMALS),
            status: w.status.as_str().to_string(),
            tx_hash: w.tx_hash.clone(),
            fail_reason: w.fail_reason.clone(),
            created_at: w.created_at,
            processed_at: w.processed_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawalHistoryResponse {
    pub withdrawals: Vec<WithdrawalItem>,
    pub total: usize,
}

/// Withdrawal history for the caller's wallet, newest first.
#[utoipa::path(
    get,
    path = "/v1/token/withdrawals",
    tag = "Token",
    params(PageQuery),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Withdrawal history", body = WithdrawalHistoryResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn withdrawal_history(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<WithdrawalHistoryResponse>, ApiError> {
    let all = state
        .ledger
        .withdrawals_for_account(&AccountId::user(&user.wallet))?;
    let (limit, offset) = page.normalize();
    let withdrawals = all
        .iter()
        .skip(offset)
        .take(limit)
        .map(WithdrawalItem::from_withdrawal)
        .collect();
    Ok(Json(WithdrawalHistoryResponse {
        withdrawals,
        total: all.len(),
    }))
}

// =============================================================================
// Shared parsing
// =============================================================================

fn parse_token_amount(raw: &str) -> Result<U256, ApiError> {
    parse_amount(raw.trim(), TOKEN_DECIMALS)
        .map_err(|e| ApiError::bad_request("invalid_amount", e.to_string()))
}

fn normalize_address(raw: &str) -> Result<String, ApiError> {
    Address::from_str(raw.trim())
        .map(|a| format!("{a:#x}"))
        .map_err(|_| ApiError::bad_request("invalid_address", "Invalid destination address"))
}
