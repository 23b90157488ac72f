// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Platform-wallet transaction building and broadcasting.
//!
//! Withdrawals leave the platform through here: an ERC-20 `transfer` from the
//! hot wallet, with the wallet's current nonce and the network-suggested gas
//! price set explicitly, and a fallback gas limit when estimation fails.

use std::str::FromStr;

use alloy::{
    network::EthereumWallet,
    primitives::{Address, U256},
    providers::{Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
};

use super::client::{ChainClient, ChainClientError};
use super::erc20::transfer_calldata;

/// Gas limit used when `eth_estimateGas` fails.
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

/// Transaction builder bound to the platform hot wallet.
pub struct TxBuilder {
    /// Token contract the transfers go through.
    token: Address,
    /// Address of the platform hot wallet.
    from: Address,
    provider: alloy::providers::fillers::FillProvider<
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::JoinFill<
                alloy::providers::Identity,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::GasFiller,
                    alloy::providers::fillers::JoinFill<
                        alloy::providers::fillers::BlobGasFiller,
                        alloy::providers::fillers::JoinFill<
                            alloy::providers::fillers::NonceFiller,
                            alloy::providers::fillers::ChainIdFiller,
                        >,
                    >,
                >,
            >,
            alloy::providers::fillers::WalletFiller<EthereumWallet>,
        >,
        alloy::providers::RootProvider<alloy::network::Ethereum>,
    >,
}

impl TxBuilder {
    /// Create a builder signing with the given platform private key.
    pub fn new(
        rpc_url: &str,
        token: Address,
        platform_private_key: &str,
    ) -> Result<Self, ChainClientError> {
        let signer = ChainClient::create_signer(platform_private_key)?;
        let from = signer.address();
        let wallet = ChainClient::create_wallet(signer);

        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainClientError::InvalidRpcUrl(e.to_string()))?;

        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

        Ok(Self {
            token,
            from,
            provider,
        })
    }

    /// Address of the platform hot wallet.
    pub fn platform_address(&self) -> Address {
        self.from
    }

    /// Sign and broadcast a token `transfer(to, amount)` from the platform
    /// wallet. Returns the transaction hash.
    pub async fn send_token_transfer(
        &self,
        to: &str,
        amount: U256,
    ) -> Result<String, ChainClientError> {
        let to_addr = Address::from_str(to)
            .map_err(|e| ChainClientError::InvalidAddress(format!("Invalid to address: {e}")))?;

        let data = transfer_calldata(to_addr, amount);

        let nonce = self
            .provider
            .get_transaction_count(self.from)
            .await
            .map_err(|e| ChainClientError::RpcError(format!("Failed to get nonce: {e}")))?;

        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| ChainClientError::RpcError(format!("Failed to get gas price: {e}")))?;

        let mut tx = TransactionRequest::default()
            .from(self.from)
            .to(self.token)
            .input(data.into());
        tx.nonce = Some(nonce);
        tx.gas_price = Some(gas_price);

        let gas_limit = match self.provider.estimate_gas(tx.clone()).await {
            Ok(limit) => limit,
            Err(e) => {
                tracing::warn!(error = %e, "Gas estimation failed, using default limit");
                DEFAULT_GAS_LIMIT
            }
        };
        let tx = tx.gas_limit(gas_limit);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| ChainClientError::TransactionFailed(format!("Failed to send: {e}")))?;

        Ok(format!("{:?}", pending.tx_hash()))
    }
}

// =============================================================================
// Amount parsing/formatting
// =============================================================================

/// Parse a human-readable decimal amount to token base units.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, ChainClientError> {
    let parts: Vec<&str> = amount.split('.').collect();

    if parts.len() > 2 || parts[0].is_empty() {
        return Err(ChainClientError::InvalidAmount(
            "Invalid amount format".to_string(),
        ));
    }

    let whole = parts[0]
        .parse::<u128>()
        .map_err(|_| ChainClientError::InvalidAmount("Invalid whole number".to_string()))?;

    let decimal_part = if parts.len() == 2 {
        let dec_str = parts[1];
        if dec_str.is_empty() || dec_str.len() > decimals as usize {
            return Err(ChainClientError::InvalidAmount(format!(
                "Too many decimal places (max {decimals})"
            )));
        }
        // Pad with zeros to match decimals
        let padded = format!("{dec_str:0<width$}", width = decimals as usize);
        padded
            .parse::<u128>()
            .map_err(|_| ChainClientError::InvalidAmount("Invalid decimal".to_string()))?
    } else {
        0u128
    };

    let multiplier = U256::from(10u64).pow(U256::from(decimals));
    let total = U256::from(whole)
        .checked_mul(multiplier)
        .and_then(|w| w.checked_add(U256::from(decimal_part)))
        .ok_or_else(|| ChainClientError::InvalidAmount("Amount overflow".to_string()))?;

    Ok(total)
}

/// Format token base units as a human-readable decimal string.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let decimal_str = format!("{remainder:0>width$}", width = decimals as usize);
        let trimmed = decimal_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{whole}.{trimmed}")
        }
    }
}
