// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! ERC-20 interface bindings and Transfer-event decoding.

use alloy::{
    primitives::{Address, FixedBytes, U256},
    rpc::types::Log,
    sol,
    sol_types::SolCall,
};

// The platform token is a standard ERC-20 contract.
sol! {
    interface IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: FixedBytes<32> = FixedBytes::new([
    0xdd, 0xf2, 0x52, 0xad, 0x1b, 0xe2, 0xc8, 0x9b, 0x69, 0xc2, 0xb0, 0x68, 0xfc, 0x37, 0x8d, 0xaa,
    0x95, 0x2b, 0xa7, 0xf1, 0x63, 0xc4, 0xa1, 0x16, 0x28, 0xf5, 0x5a, 0x4d, 0xf5, 0x23, 0xb3, 0xef,
]);

/// ABI-encode a `transfer(to, amount)` call.
pub fn transfer_calldata(to: Address, amount: U256) -> Vec<u8> {
    IERC20::transferCall { to, amount }.abi_encode()
}

/// A decoded ERC-20 Transfer event.
#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub tx_hash: String,
    pub block_number: u64,
    /// Sender, lowercase hex.
    pub from: String,
    /// Recipient, lowercase hex.
    pub to: String,
    /// Value in token base units.
    pub amount: U256,
}

/// Decode a Transfer event from a raw log.
///
/// Returns `None` for logs that are not well-formed Transfer events or that
/// lack a transaction hash / block number (still-pending logs).
pub fn decode_transfer_log(log: &Log) -> Option<TransferEvent> {
    // Transfer has 3 topics: [event_sig, from, to] and data = value
    let topics = log.topics();
    if topics.len() < 3 || topics[0] != TRANSFER_TOPIC {
        return None;
    }

    // Addresses are the last 20 bytes of the 32-byte indexed topics
    let from = format!("0x{}", alloy::hex::encode(&topics[1][12..]));
    let to = format!("0x{}", alloy::hex::encode(&topics[2][12..]));

    let data = &log.data().data;
    if data.len() < 32 {
        return None;
    }
    let amount = U256::from_be_slice(&data[..32]);

    let tx_hash = log.transaction_hash.map(|h| format!("{h:#x}"))?;
    let block_number = log.block_number?;

    Some(TransferEvent {
        tx_hash,
        block_number,
        from,
        to,
        amount,
    })
}
