// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Reward endpoints: daily check-in, grant history, pool stats, and the tip
//! leaderboard.

use std::collections::HashMap;

use alloy::primitives::U256;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::PageQuery;
use crate::auth::Auth;
use crate::blockchain::format_amount;
use crate::error::ApiError;
use crate::models::{AccountId, Reward, RewardType, TOKEN_DECIMALS};
use crate::state::AppState;

// =============================================================================
// Check-in
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckInResponse {
    pub reward_id: u64,
    pub amount: String,
}

/// Claim the daily check-in reward.
#[utoipa::path(
    post,
    path = "/v1/token/checkin",
    tag = "Rewards",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Checked in", body = CheckInResponse),
        (status = 400, description = "Already checked in today, or pool exhausted"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn check_in(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<CheckInResponse>, ApiError> {
    let reward = state
        .rewards
        .grant(AccountId::user(&user.wallet), RewardType::CheckIn, None)?;

    Ok(Json(CheckInResponse {
        reward_id: reward.id,
        amount: format_amount(reward.amount, TOKEN_DECIMALS),
    }))
}

// =============================================================================
// History
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct RewardItem {
    pub reward_id: u64,
    pub reward_type: String,
    pub amount: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl RewardItem {
    fn from_reward(r: &Reward) -> Self {
        let (reference_type, reference_id) = match &r.reference {
            Some((kind, id)) => (Some(kind.clone()), Some(*id)),
            None => (None, None),
        };
        Self {
            reward_id: r.id,
            reward_type: r.reward_type.as_str().to_string(),
            amount: format_amount(r.amount, TOKEN_DECIMALS),
            reference_type,
            reference_id,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RewardHistoryResponse {
    pub rewards: Vec<RewardItem>,
    pub total: usize,
}

/// Reward history for the caller's wallet, newest first.
#[utoipa::path(
    get,
    path = "/v1/token/rewards",
    tag = "Rewards",
    params(PageQuery),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Reward history", body = RewardHistoryResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn reward_history(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<RewardHistoryResponse>, ApiError> {
    let (limit, offset) = page.normalize();
    let (rewards, total) = state.ledger.rewards_for_wallet(&user.wallet, limit, offset)?;
    Ok(Json(RewardHistoryResponse {
        rewards: rewards.iter().map(RewardItem::from_reward).collect(),
        total,
    }))
}

/// Reward history for an agent, newest first.
#[utoipa::path(
    get,
    path = "/v1/agents/{agent_id}/rewards",
    tag = "Agents",
    params(("agent_id" = u64, Path, description = "Agent id"), PageQuery),
    responses((status = 200, description = "Reward history", body = RewardHistoryResponse))
)]
pub async fn agent_reward_history(
    State(state): State<AppState>,
    Path(agent_id): Path<u64>,
    Query(page): Query<PageQuery>,
) -> Result<Json<RewardHistoryResponse>, ApiError> {
    let (limit, offset) = page.normalize();
    let (rewards, total) = state.ledger.rewards_for_agent(agent_id, limit, offset)?;
    Ok(Json(RewardHistoryResponse {
        rewards: rewards.iter().map(RewardItem::from_reward).collect(),
        total,
    }))
}

// =============================================================================
// Pool stats
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct PoolStatsResponse {
    pub pool_balance: String,
    pub total_deposited: String,
    pub total_distributed: String,
    pub today_distributed: String,
}

/// Main reward-pool statistics.
#[utoipa::path(
    get,
    path = "/v1/token/pool/stats",
    tag = "Rewards",
    responses(
        (status = 200, description = "Pool stats", body = PoolStatsResponse),
        (status = 404, description = "Pool not initialized")
    )
)]
pub async fn pool_stats(
    State(state): State<AppState>,
) -> Result<Json<PoolStatsResponse>, ApiError> {
    let stats = state
        .rewards
        .pool_stats()?
        .ok_or_else(|| ApiError::not_found("Reward pool not initialized"))?;

    Ok(Json(PoolStatsResponse {
        pool_balance: format_amount(stats.pool.balance, TOKEN_DECIMALS),
        total_deposited: format_amount(stats.pool.total_deposited, TOKEN_DECIMALS),
        total_distributed: format_amount(stats.pool.total_distributed, TOKEN_DECIMALS),
        today_distributed: format_amount(stats.today_distributed, TOKEN_DECIMALS),
    }))
}

// =============================================================================
// Tip leaderboard
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct LeaderboardQuery {
    /// Aggregation window: all | daily | weekly | monthly
    pub period: Option<String>,
    /// Max entries (1..=100, default 20)
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    pub agent_id: u64,
    /// Total received by the agent (net of platform fees)
    pub total_tips: String,
    pub tip_count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub period: String,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Agents ranked by tips received over a time window.
#[utoipa::path(
    get,
    path = "/v1/token/leaderboard",
    tag = "Rewards",
    params(LeaderboardQuery),
    responses((status = 200, description = "Leaderboard", body = LeaderboardResponse))
)]
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let period = query.period.as_deref().unwrap_or("all").to_string();
    let limit = query.limit.unwrap_or(20).clamp(1, 100) as usize;

    let cutoff = match period.as_str() {
        "daily" => Some(Utc::now() - Duration::days(1)),
        "weekly" => Some(Utc::now() - Duration::days(7)),
        "monthly" => Some(Utc::now() - Duration::days(30)),
        _ => None,
    };

    let mut totals: HashMap<u64, (U256, u64)> = HashMap::new();
    for tip in state.ledger.tips()? {
        if let Some(cutoff) = cutoff {
            if tip.created_at < cutoff {
                continue;
            }
        }
        let entry = totals.entry(tip.to_agent).or_insert((U256::ZERO, 0));
        entry.0 += tip.agent_received;
        entry.1 += 1;
    }

    let mut ranked: Vec<(u64, (U256, u64))> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0));
    ranked.truncate(limit);

    Ok(Json(LeaderboardResponse {
        period,
        leaderboard: ranked
            .into_iter()
            .map(|(agent_id, (total, count))| LeaderboardEntry {
                agent_id,
                total_tips: format_amount(total, TOKEN_DECIMALS),
                tip_count: count,
            })
            .collect(),
    }))
}
