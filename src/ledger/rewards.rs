// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Reward distribution engine.
//!
//! Grants are drawn from the `"main"` pool under three caps checked inside
//! the grant transaction itself: per-type per-recipient daily limits, the
//! platform-wide daily ceiling, and the pool's own balance/depletion floor.

use std::sync::Arc;

use alloy::primitives::U256;
use chrono::{NaiveDate, Utc};

use super::db::GrantRequest;
use super::{LedgerDb, LedgerResult};
use crate::config::MAIN_POOL;
use crate::models::{AccountId, Reward, RewardConfig, RewardPool, RewardType};

/// Whole tokens at the ledger's 18-decimal scale.
fn whole_tokens(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

/// Default reward schedule, seeded at startup for configs not yet present.
pub fn default_reward_configs() -> Vec<RewardConfig> {
    vec![
        RewardConfig {
            reward_type: RewardType::CheckIn,
            amount: whole_tokens(5_000),
            daily_limit: 1,
            is_active: true,
            description: "Daily check-in reward".to_string(),
        },
        RewardConfig {
            reward_type: RewardType::Post,
            amount: whole_tokens(2_500),
            daily_limit: 5,
            is_active: true,
            description: "Agent post reward, up to 5 per day".to_string(),
        },
        RewardConfig {
            reward_type: RewardType::TipSend,
            amount: whole_tokens(500),
            daily_limit: 20,
            is_active: true,
            description: "Tip-sent reward, up to 20 per day".to_string(),
        },
        RewardConfig {
            reward_type: RewardType::TipReceive,
            amount: whole_tokens(1_000),
            daily_limit: 50,
            is_active: true,
            description: "Tip-received bonus for agents, up to 50 per day".to_string(),
        },
        RewardConfig {
            reward_type: RewardType::Like,
            amount: whole_tokens(50),
            daily_limit: 50,
            is_active: true,
            description: "Like reward, up to 50 per day".to_string(),
        },
        RewardConfig {
            reward_type: RewardType::Comment,
            amount: whole_tokens(250),
            daily_limit: 10,
            is_active: true,
            description: "Comment reward, up to 10 per day".to_string(),
        },
        RewardConfig {
            reward_type: RewardType::Invite,
            amount: U256::ZERO,
            daily_limit: 0,
            is_active: false,
            description: "Invite reward (not open yet)".to_string(),
        },
        RewardConfig {
            reward_type: RewardType::HotPost,
            amount: whole_tokens(10_000),
            daily_limit: 3,
            is_active: true,
            description: "Daily top-10 post reward, up to 3 per day".to_string(),
        },
    ]
}

/// Reward pool snapshot for the stats endpoint.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub pool: RewardPool,
    pub today_distributed: U256,
}

/// Grants rewards from the main pool under the configured caps.
pub struct RewardEngine {
    ledger: Arc<LedgerDb>,
    global_daily_cap: U256,
    pool_floor: U256,
}

impl RewardEngine {
    pub fn new(ledger: Arc<LedgerDb>, global_daily_cap: U256, pool_floor: U256) -> Self {
        Self {
            ledger,
            global_daily_cap,
            pool_floor,
        }
    }

    /// Seed the main pool and the default reward schedule. Idempotent:
    /// existing pools and configs are left untouched.
    pub fn seed(&self, initial_pool_balance: U256) -> LedgerResult<()> {
        self.ledger.init_reward_pool(MAIN_POOL, initial_pool_balance)?;
        for config in default_reward_configs() {
            self.ledger.seed_reward_config(config)?;
        }
        Ok(())
    }

    /// Grant a reward, counted against today (UTC).
    pub fn grant(
        &self,
        recipient: AccountId,
        reward_type: RewardType,
        reference: Option<(String, u64)>,
    ) -> LedgerResult<Reward> {
        self.grant_on(recipient, reward_type, reference, Utc::now().date_naive())
    }

    /// Grant a reward counted against an explicit calendar day.
    pub fn grant_on(
        &self,
        recipient: AccountId,
        reward_type: RewardType,
        reference: Option<(String, u64)>,
        date: NaiveDate,
    ) -> LedgerResult<Reward> {
        let recipient_wallet = recipient.wallet().map(|w| w.to_string());
        self.ledger.grant_reward(GrantRequest {
            recipient,
            recipient_wallet,
            reward_type,
            reference,
            pool: MAIN_POOL.to_string(),
            global_daily_cap: self.global_daily_cap,
            pool_floor: self.pool_floor,
            today: date,
        })
    }

    /// Main-pool balance, lifetime totals, and today's distribution.
    pub fn pool_stats(&self) -> LedgerResult<Option<PoolStats>> {
        let pool = match self.ledger.reward_pool(MAIN_POOL)? {
            Some(pool) => pool,
            None => return Ok(None),
        };
        let today_distributed = self.ledger.distributed_on(Utc::now().date_naive())?;
        Ok(Some(PoolStats {
            pool,
            today_distributed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;

    fn engine() -> (RewardEngine, Arc<LedgerDb>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerDb::open(&dir.path().join("ledger.redb")).unwrap());
        let engine = RewardEngine::new(
            ledger.clone(),
            whole_tokens(10_000_000_000),
            whole_tokens(1_000),
        );
        engine.seed(whole_tokens(1_000_000)).unwrap();
        (engine, ledger, dir)
    }

    #[test]
    fn seed_writes_the_default_schedule() {
        let (_engine, ledger, _dir) = engine();

        let post = ledger.reward_config(RewardType::Post).unwrap().unwrap();
        assert_eq!(post.amount, whole_tokens(2_500));
        assert_eq!(post.daily_limit, 5);
        assert!(post.is_active);

        let invite = ledger.reward_config(RewardType::Invite).unwrap().unwrap();
        assert!(!invite.is_active);
    }

    #[test]
    fn seeded_defaults_allow_check_in() {
        let (engine, ledger, _dir) = engine();
        let wallet = "0xaaaa000000000000000000000000000000000001";

        let reward = engine
            .grant(AccountId::user(wallet), RewardType::CheckIn, None)
            .unwrap();
        assert_eq!(reward.amount, whole_tokens(5_000));
        assert_eq!(reward.recipient_wallet.as_deref(), Some(wallet));

        let account = ledger.account(&AccountId::user(wallet)).unwrap().unwrap();
        assert_eq!(account.total_rewards, whole_tokens(5_000));
    }

    #[test]
    fn seeding_twice_does_not_reset_the_pool() {
        let (engine, ledger, _dir) = engine();
        engine
            .grant(
                AccountId::user("0xaaaa000000000000000000000000000000000001"),
                RewardType::CheckIn,
                None,
            )
            .unwrap();

        engine.seed(whole_tokens(1_000_000)).unwrap();
        let pool = ledger.reward_pool(MAIN_POOL).unwrap().unwrap();
        assert_eq!(pool.balance, whole_tokens(995_000));
    }

    #[test]
    fn invite_rewards_are_disabled_by_default() {
        let (engine, _ledger, _dir) = engine();
        let result = engine.grant(
            AccountId::user("0xaaaa000000000000000000000000000000000001"),
            RewardType::Invite,
            None,
        );
        assert!(matches!(result, Err(LedgerError::RewardTypeDisabled)));
    }

    #[test]
    fn pool_stats_track_todays_distribution() {
        let (engine, _ledger, _dir) = engine();
        engine
            .grant(
                AccountId::user("0xaaaa000000000000000000000000000000000001"),
                RewardType::CheckIn,
                None,
            )
            .unwrap();

        let stats = engine.pool_stats().unwrap().unwrap();
        assert_eq!(stats.pool.balance, whole_tokens(995_000));
        assert_eq!(stats.today_distributed, whole_tokens(5_000));
    }

    #[test]
    fn tip_reference_is_recorded_on_the_grant() {
        let (engine, _ledger, _dir) = engine();
        let reward = engine
            .grant(
                AccountId::agent(7),
                RewardType::TipReceive,
                Some(("tip".to_string(), 99)),
            )
            .unwrap();
        assert_eq!(reward.reference, Some(("tip".to_string(), 99)));
    }
}
