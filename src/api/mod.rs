// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! HTTP API (Axum) over the ledger core.
//!
//! The routes are thin glue: parse/format at the boundary, then call one
//! core operation. Swagger UI is served at `/docs`.

use axum::{
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod rewards;
pub mod token;

/// Shared page/limit query parameters.
#[derive(Debug, Deserialize, IntoParams)]
pub struct PageQuery {
    /// 1-based page number (default 1)
    pub page: Option<u32>,
    /// Page size (1..=100, default 20)
    pub limit: Option<u32>,
}

impl PageQuery {
    /// Normalize to `(limit, offset)`.
    pub fn normalize(&self) -> (usize, usize) {
        let limit = self.limit.unwrap_or(20).clamp(1, 100) as usize;
        let page = self.page.unwrap_or(1).max(1) as usize;
        (limit, (page - 1) * limit)
    }
}

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/wallet", post(auth::wallet_challenge))
        .route("/auth/verify", post(auth::verify_signature))
        .route("/token/deposit-address", get(token::deposit_address))
        .route("/token/balance", get(token::balance))
        .route("/token/deposits", get(token::deposit_history))
        .route("/token/withdraw", post(token::request_withdrawal))
        .route("/token/withdrawals", get(token::withdrawal_history))
        .route("/token/checkin", post(rewards::check_in))
        .route("/token/rewards", get(rewards::reward_history))
        .route("/token/pool/stats", get(rewards::pool_stats))
        .route("/token/leaderboard", get(rewards::leaderboard))
        .route("/posts/{post_id}/tip", post(token::tip_post))
        .route("/agents/withdraw", post(token::agent_request_withdrawal))
        .route("/agents/{agent_id}/balance", get(token::agent_balance))
        .route("/agents/{agent_id}/rewards", get(rewards::agent_reward_history))
        .route("/admin/agent-keys", post(admin::issue_agent_key))
        .route("/admin/pool/deposit", post(admin::pool_deposit))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::wallet_challenge,
        auth::verify_signature,
        token::deposit_address,
        token::balance,
        token::deposit_history,
        token::request_withdrawal,
        token::withdrawal_history,
        token::tip_post,
        token::agent_balance,
        token::agent_request_withdrawal,
        rewards::check_in,
        rewards::reward_history,
        rewards::agent_reward_history,
        rewards::pool_stats,
        rewards::leaderboard,
        admin::issue_agent_key,
        admin::pool_deposit
    ),
    components(
        schemas(
            auth::ChallengeRequest,
            auth::ChallengeResponse,
            auth::VerifyRequest,
            auth::VerifyResponse,
            token::DepositAddressResponse,
            token::BalanceResponse,
            token::TipRequest,
            token::TipResponse,
            token::WithdrawRequest,
            token::AgentWithdrawRequest,
            token::WithdrawResponse,
            token::DepositItem,
            token::DepositHistoryResponse,
            token::WithdrawalItem,
            token::WithdrawalHistoryResponse,
            rewards::CheckInResponse,
            rewards::RewardItem,
            rewards::RewardHistoryResponse,
            rewards::PoolStatsResponse,
            rewards::LeaderboardEntry,
            rewards::LeaderboardResponse,
            admin::IssueAgentKeyRequest,
            admin::IssueAgentKeyResponse,
            admin::PoolDepositRequest,
            admin::PoolDepositResponse
        )
    ),
    tags(
        (name = "Auth", description = "Wallet-signature login"),
        (name = "Token", description = "Balances, deposits, tips, withdrawals"),
        (name = "Agents", description = "Agent balances and withdrawals"),
        (name = "Rewards", description = "Reward grants, history, pool stats"),
        (name = "Admin", description = "Operator endpoints")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use alloy::primitives::{Address, U256};

    use crate::config::AppConfig;
    use crate::ledger::LedgerDb;

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            rpc_url: "http://localhost:8545".to_string(),
            token_contract: Address::ZERO,
            platform_private_key: None,
            key_encryption_key: [0x11u8; 32],
            jwt_secret: "test-secret".to_string(),
            admin_token: Some("admin".to_string()),
            db_path: dir.path().join("ledger.redb"),
            deposit_confirmations: 1,
            tip_fee_bps: 500,
            withdraw_fee_bps: 100,
            min_deposit: U256::from(1u64),
            min_withdraw: U256::from(1u64),
            reward_global_daily_cap: U256::MAX,
            reward_pool_floor: U256::ZERO,
            reward_pool_initial: U256::ZERO,
        };
        let ledger = Arc::new(LedgerDb::open(&config.db_path).unwrap());
        AppState::new(config, ledger, None)
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(&dir));
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[test]
    fn page_query_normalizes_bounds() {
        let q = PageQuery {
            page: None,
            limit: None,
        };
        assert_eq!(q.normalize(), (20, 0));

        let q = PageQuery {
            page: Some(3),
            limit: Some(250),
        };
        assert_eq!(q.normalize(), (100, 200));

        let q = PageQuery {
            page: Some(0),
            limit: Some(0),
        };
        assert_eq!(q.normalize(), (1, 0));
    }
}
