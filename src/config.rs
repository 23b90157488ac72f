// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup into an
//! immutable [`AppConfig`]; nothing re-reads the environment afterwards.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `RPC_URL` | Settlement-chain JSON-RPC endpoint | BSC public dataseed |
//! | `TOKEN_CONTRACT` | Platform token (ERC-20) contract address | Required |
//! | `PLATFORM_PRIVATE_KEY` | Hot-wallet key for withdrawal broadcasts | Optional (drain idles without it) |
//! | `KEY_ENCRYPTION_KEY` | 32-byte hex AEAD key for custodial keys at rest | Required |
//! | `JWT_SECRET` | HS256 secret for login sessions | Dev fallback (warned) |
//! | `ADMIN_TOKEN` | Bearer token for admin endpoints | Optional (admin routes reject) |
//! | `LEDGER_DB_PATH` | Path of the embedded ledger database | `/data/ledger.redb` |
//! | `DEPOSIT_CONFIRMATIONS` | Blocks required before crediting a deposit | `12` |
//! | `TIP_FEE_BPS` | Platform cut of tips, basis points | `500` |
//! | `WITHDRAW_FEE_BPS` | Withdrawal fee, basis points | `100` |
//! | `MIN_DEPOSIT` | Minimum credited deposit, whole tokens | `1` |
//! | `MIN_WITHDRAW` | Minimum withdrawal, whole tokens | `100` |
//! | `REWARD_GLOBAL_DAILY_CAP` | Platform-wide daily reward ceiling, whole tokens | `10000000000` |
//! | `REWARD_POOL_FLOOR` | Pool balance below which grants pause, whole tokens | `1000000000` |
//! | `REWARD_POOL_INITIAL` | Opening balance of the main pool, whole tokens | `0` |
//! | `LOG_FORMAT` | `json` or `pretty` | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use alloy::primitives::{Address, U256};

use crate::blockchain::parse_amount;
use crate::models::TOKEN_DECIMALS;

/// Default public RPC endpoint (BNB Smart Chain).
pub const DEFAULT_RPC_URL: &str = "https://bsc-dataseed.binance.org";

/// Name of the single authoritative reward pool.
pub const MAIN_POOL: &str = "main";

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Settlement-chain JSON-RPC endpoint.
    pub rpc_url: String,
    /// Platform token contract.
    pub token_contract: Address,
    /// Hot-wallet private key (hex). Withdrawals stay queued without it.
    pub platform_private_key: Option<String>,
    /// AEAD key guarding custodial private keys at rest.
    pub key_encryption_key: [u8; 32],
    /// HS256 secret for wallet-login sessions.
    pub jwt_secret: String,
    /// Bearer token gating admin endpoints.
    pub admin_token: Option<String>,
    /// Path of the embedded ledger database file.
    pub db_path: PathBuf,
    /// Confirmations required before a deposit is credited.
    pub deposit_confirmations: u64,
    /// Platform cut of tips, in basis points.
    pub tip_fee_bps: u32,
    /// Withdrawal fee, in basis points.
    pub withdraw_fee_bps: u32,
    /// Deposits below this are silently ignored (base units).
    pub min_deposit: U256,
    /// Minimum withdrawal amount (base units).
    pub min_withdraw: U256,
    /// Platform-wide daily reward ceiling (base units).
    pub reward_global_daily_cap: U256,
    /// Pool balance below which reward grants pause (base units).
    pub reward_pool_floor: U256,
    /// Opening balance seeded into the main pool (base units).
    pub reward_pool_initial: U256,
}

impl AppConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token_contract = require("TOKEN_CONTRACT").and_then(|raw| {
            Address::from_str(&raw).map_err(|e| ConfigError::Invalid {
                var: "TOKEN_CONTRACT",
                message: e.to_string(),
            })
        })?;

        let key_encryption_key = require("KEY_ENCRYPTION_KEY").and_then(|raw| {
            let bytes = alloy::hex::decode(raw.trim_start_matches("0x")).map_err(|e| {
                ConfigError::Invalid {
                    var: "KEY_ENCRYPTION_KEY",
                    message: e.to_string(),
                }
            })?;
            <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| ConfigError::Invalid {
                var: "KEY_ENCRYPTION_KEY",
                message: "expected 32 bytes of hex".to_string(),
            })
        })?;

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set, using development fallback");
                "agentpay-dev-jwt-secret".to_string()
            }
        };

        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 8080)?,
            rpc_url: env_or("RPC_URL", DEFAULT_RPC_URL),
            token_contract,
            platform_private_key: env::var("PLATFORM_PRIVATE_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            key_encryption_key,
            jwt_secret,
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            db_path: PathBuf::from(env_or("LEDGER_DB_PATH", "/data/ledger.redb")),
            deposit_confirmations: parse_env("DEPOSIT_CONFIRMATIONS", 12)?,
            tip_fee_bps: parse_env("TIP_FEE_BPS", 500)?,
            withdraw_fee_bps: parse_env("WITHDRAW_FEE_BPS", 100)?,
            min_deposit: token_amount_env("MIN_DEPOSIT", "1")?,
            min_withdraw: token_amount_env("MIN_WITHDRAW", "100")?,
            reward_global_daily_cap: token_amount_env("REWARD_GLOBAL_DAILY_CAP", "10000000000")?,
            reward_pool_floor: token_amount_env("REWARD_POOL_FLOOR", "1000000000")?,
            reward_pool_initial: token_amount_env("REWARD_POOL_INITIAL", "0")?,
        })
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(var)),
    }
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn parse_env<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(value) if !value.is_empty() => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            message: e.to_string(),
        }),
        _ => Ok(default),
    }
}

/// Read a whole-token amount from the environment and scale to base units.
fn token_amount_env(var: &'static str, default: &str) -> Result<U256, ConfigError> {
    let raw = env_or(var, default);
    parse_amount(&raw, TOKEN_DECIMALS).map_err(|e| ConfigError::Invalid {
        var,
        message: e.to_string(),
    })
}
