// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Admin endpoints, gated by the configured `ADMIN_TOKEN` bearer token:
//! agent API-key issuance and reward-pool top-ups.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{generate_agent_key, hash_agent_key, AdminAuth};
use crate::blockchain::{format_amount, parse_amount};
use crate::config::MAIN_POOL;
use crate::error::ApiError;
use crate::models::TOKEN_DECIMALS;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct IssueAgentKeyRequest {
    pub agent_id: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssueAgentKeyResponse {
    pub agent_id: u64,
    /// Shown exactly once; only its digest is stored
    pub api_key: String,
}

/// Issue an API key for an agent.
#[utoipa::path(
    post,
    path = "/v1/admin/agent-keys",
    tag = "Admin",
    request_body = IssueAgentKeyRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Key issued", body = IssueAgentKeyResponse),
        (status = 403, description = "Admin token missing or wrong")
    )
)]
pub async fn issue_agent_key(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Json(req): Json<IssueAgentKeyRequest>,
) -> Result<Json<IssueAgentKeyResponse>, ApiError> {
    let api_key = generate_agent_key();
    state
        .ledger
        .register_agent_key(req.agent_id, &hash_agent_key(&api_key))?;

    Ok(Json(IssueAgentKeyResponse {
        agent_id: req.agent_id,
        api_key,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PoolDepositRequest {
    /// Amount as a decimal string
    pub amount: String,
    /// Funding source label, e.g. "manual" or "tax"
    pub source: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PoolDepositResponse {
    pub pool: String,
    pub amount: String,
    pub pool_balance: String,
}

/// Inject funds into the main reward pool.
#[utoipa::path(
    post,
    path = "/v1/admin/pool/deposit",
    tag = "Admin",
    request_body = PoolDepositRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Pool credited", body = PoolDepositResponse),
        (status = 403, description = "Admin token missing or wrong")
    )
)]
pub async fn pool_deposit(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Json(req): Json<PoolDepositRequest>,
) -> Result<Json<PoolDepositResponse>, ApiError> {
    let amount = parse_amount(req.amount.trim(), TOKEN_DECIMALS)
        .map_err(|e| ApiError::bad_request("invalid_amount", e.to_string()))?;
    let source = req.source.as_deref().unwrap_or("manual");

    let record = state
        .ledger
        .deposit_to_pool(MAIN_POOL, amount, source, req.note.clone())?;
    let pool = state
        .ledger
        .reward_pool(MAIN_POOL)?
        .ok_or_else(|| ApiError::not_found("Reward pool not initialized"))?;

    Ok(Json(PoolDepositResponse {
        pool: record.pool,
        amount: format_amount(record.amount, TOKEN_DECIMALS),
        pool_balance: format_amount(pool.balance, TOKEN_DECIMALS),
    }))
}
