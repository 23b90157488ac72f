// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Core ledger data model.
//!
//! All amounts are ERC-20 **base units** held in [`U256`] — fixed-point
//! integers with an implied scale of 18 fractional digits matching the token
//! contract. No floating point touches ledger arithmetic; human-readable
//! decimal strings are parsed/formatted at the API boundary only.

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of fractional digits carried by every ledger amount.
pub const TOKEN_DECIMALS: u8 = 18;

// =============================================================================
// Accounts
// =============================================================================

/// Identity of a ledger account.
///
/// Resolved once at the API boundary; everything below this point operates on
/// the tagged variant instead of `"user"`/`"agent"` strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AccountId {
    /// A user, identified by their login wallet address (lowercase hex).
    User { wallet: String },
    /// An AI agent, identified by its platform-assigned id.
    Agent { id: u64 },
}

impl AccountId {
    /// Account for a user wallet. The address is normalized to lowercase.
    pub fn user(wallet: &str) -> Self {
        Self::User {
            wallet: wallet.to_ascii_lowercase(),
        }
    }

    /// Account for an agent.
    pub fn agent(id: u64) -> Self {
        Self::Agent { id }
    }

    /// Stable storage key, also used to scope per-recipient daily counters.
    pub fn storage_key(&self) -> String {
        match self {
            Self::User { wallet } => format!("user:{wallet}"),
            Self::Agent { id } => format!("agent:{id}"),
        }
    }

    /// The wallet address, for user accounts.
    pub fn wallet(&self) -> Option<&str> {
        match self {
            Self::User { wallet } => Some(wallet),
            Self::Agent { .. } => None,
        }
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// A ledger account. Created lazily on first credit, never deleted.
///
/// Invariants: `balance` and `locked_balance` are non-negative by
/// construction (U256 + checked subtraction); `balance + locked_balance` is
/// conserved across a lock/unlock pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Spendable balance.
    pub balance: U256,
    /// Funds reserved for in-flight withdrawals.
    pub locked_balance: U256,
    /// Cumulative confirmed deposits.
    pub total_deposited: U256,
    /// Cumulative completed withdrawals (gross amount, fee included).
    pub total_withdrawn: U256,
    /// Cumulative tips sent.
    pub total_tipped: U256,
    /// Cumulative tips received (net of platform fee).
    pub total_received: U256,
    /// Cumulative reward grants.
    pub total_rewards: U256,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Fresh zero-balance account.
    pub fn new(id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            id,
            balance: U256::ZERO,
            locked_balance: U256::ZERO,
            total_deposited: U256::ZERO,
            total_withdrawn: U256::ZERO,
            total_tipped: U256::ZERO,
            total_received: U256::ZERO,
            total_rewards: U256::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Custodial addresses & deposits
// =============================================================================

/// A platform-controlled deposit address.
///
/// The private key is stored as a nonce-prefixed AEAD ciphertext (hex) and is
/// only decrypted transiently inside a signing scope. An assignment, once
/// made, is permanent: addresses are never recycled across identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodialAddress {
    /// On-chain address, lowercase hex.
    pub address: String,
    /// AES-256-GCM ciphertext of the 32-byte private key, nonce prepended.
    pub encrypted_private_key: String,
    /// Wallet identity this address is bound to; `None` = pool-available.
    pub assigned_to: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
}

/// Lifecycle of an inbound on-chain transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Confirmed,
    Failed,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

/// Immutable record of an inbound on-chain transfer.
///
/// `tx_hash` uniqueness is the idempotency key preventing double-credit; the
/// Pending→Confirmed transition is the single point where the ledger is
/// credited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub tx_hash: String,
    pub block_number: u64,
    /// Custodial address the funds landed on.
    pub deposit_address: String,
    /// Wallet identity the custodial address is assigned to.
    pub wallet_address: String,
    pub amount: U256,
    pub status: DepositStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Withdrawals & tips
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// An outbound on-chain transfer request.
///
/// Funds move from `balance` to `locked_balance` at creation. Terminal states
/// either convert the locked amount to `total_withdrawn` (Completed) or
/// return it in full to `balance` (Failed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: u64,
    pub account: AccountId,
    /// Destination address on chain.
    pub to_address: String,
    /// Gross amount locked from the account.
    pub amount: U256,
    /// Platform fee, retained on completion.
    pub fee: U256,
    /// Amount actually broadcast on chain (`amount - fee`).
    pub net_amount: U256,
    pub status: WithdrawalStatus,
    pub tx_hash: Option<String>,
    pub fail_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Immutable record of an internal user→agent transfer. Settled atomically
/// at creation time; there is no pending state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tip {
    pub id: u64,
    pub from_wallet: String,
    pub to_agent: u64,
    /// Post that was tipped.
    pub post_ref: u64,
    pub amount: U256,
    pub platform_fee: U256,
    /// `amount - platform_fee`.
    pub agent_received: U256,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Rewards
// =============================================================================

/// Programmatic reward categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    CheckIn,
    Post,
    TipSend,
    TipReceive,
    Like,
    Comment,
    Invite,
    HotPost,
}

impl RewardType {
    /// Stable identifier used as the config table key and in counter keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckIn => "checkin",
            Self::Post => "post",
            Self::TipSend => "tip_send",
            Self::TipReceive => "tip_receive",
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Invite => "invite",
            Self::HotPost => "hot_post",
        }
    }
}

impl std::fmt::Display for RewardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-type reward configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    pub reward_type: RewardType,
    /// Amount granted per claim, in base units.
    pub amount: U256,
    /// Per-recipient daily claim limit; 0 = unlimited.
    pub daily_limit: u32,
    pub is_active: bool,
    pub description: String,
}

/// A shared fund rewards are drawn from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardPool {
    pub name: String,
    pub balance: U256,
    pub total_deposited: U256,
    pub total_distributed: U256,
    pub is_active: bool,
}

/// Audit record of funds injected into a reward pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolDeposit {
    pub id: u64,
    pub pool: String,
    pub amount: U256,
    /// Where the funds came from: "tax", "manual", …
    pub source: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable record of a granted reward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: u64,
    pub recipient: AccountId,
    /// Login wallet of the recipient, when there is one; kept for per-wallet
    /// history queries.
    pub recipient_wallet: Option<String>,
    pub reward_type: RewardType,
    pub amount: U256,
    /// What triggered the grant: ("tip", tip id), ("post", post id), …
    pub reference: Option<(String, u64)>,
    /// Pool the grant was drawn from.
    pub pool: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Platform income
// =============================================================================

/// Revenue retained by the platform (tip fees today; withdrawal fees are
/// retained implicitly by never re-crediting them).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformIncome {
    pub id: u64,
    /// Revenue category, e.g. "tip_fee".
    pub income_type: String,
    pub amount: U256,
    pub reference: Option<(String, u64)>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_normalizes_wallet_case() {
        let id = AccountId::user("0xABCdef0123456789ABCdef0123456789ABCdef01");
        assert_eq!(
            id.storage_key(),
            "user:0xabcdef0123456789abcdef0123456789abcdef01"
        );
    }

    #[test]
    fn account_id_round_trips_through_serde() {
        let user = AccountId::user("0xaa");
        let agent = AccountId::agent(7);

        let user_json = serde_json::to_string(&user).unwrap();
        let agent_json = serde_json::to_string(&agent).unwrap();
        assert_eq!(serde_json::from_str::<AccountId>(&user_json).unwrap(), user);
        assert_eq!(
            serde_json::from_str::<AccountId>(&agent_json).unwrap(),
            agent
        );
    }

    #[test]
    fn new_account_is_zeroed() {
        let account = Account::new(AccountId::agent(1));
        assert_eq!(account.balance, U256::ZERO);
        assert_eq!(account.locked_balance, U256::ZERO);
        assert_eq!(account.total_rewards, U256::ZERO);
    }

    #[test]
    fn reward_type_identifiers_are_stable() {
        assert_eq!(RewardType::CheckIn.as_str(), "checkin");
        assert_eq!(RewardType::TipReceive.as_str(), "tip_receive");
        assert_eq!(RewardType::HotPost.as_str(), "hot_post");
    }

    #[test]
    fn amounts_round_trip_through_serde() {
        let deposit = Deposit {
            tx_hash: "0xabc".to_string(),
            block_number: 100,
            deposit_address: "0x11".to_string(),
            wallet_address: "0x22".to_string(),
            amount: U256::from(1_000_000_000_000_000_000u64),
            status: DepositStatus::Pending,
            created_at: Utc::now(),
            confirmed_at: None,
        };
        let json = serde_json::to_vec(&deposit).unwrap();
        let back: Deposit = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.amount, deposit.amount);
        assert_eq!(back.status, DepositStatus::Pending);
    }
}
