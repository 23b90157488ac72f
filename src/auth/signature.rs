// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! EIP-191 personal-sign verification.
//!
//! Wallet login proves control of an address by signing a challenge message
//! with the standard `personal_sign` prefixed-hash scheme. Verification
//! recovers the signer's public key from the 65-byte signature and compares
//! the derived address to the claimed one.

use alloy::primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

/// Signature verification errors.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid signature encoding: {0}")]
    InvalidSignatureHex(String),

    #[error("invalid signature length: expected 65, got {0}")]
    InvalidSignatureLength(usize),

    #[error("invalid recovery id")]
    InvalidRecoveryId,

    #[error("failed to recover public key")]
    RecoveryFailed,
}

/// Hash a message with the EIP-191 `personal_sign` prefix.
pub fn eip191_hash(message: &str) -> B256 {
    let prefixed = format!("\x19Ethereum Signed Message:\n{}{}", message.len(), message);
    keccak256(prefixed.as_bytes())
}

/// Recover the signing address from a personal-sign signature.
pub fn recover_address(message: &str, signature_hex: &str) -> Result<Address, SignatureError> {
    let sig_bytes = alloy::hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| SignatureError::InvalidSignatureHex(e.to_string()))?;

    if sig_bytes.len() != 65 {
        return Err(SignatureError::InvalidSignatureLength(sig_bytes.len()));
    }

    // Wallets emit v as 27/28 or 0/1; normalize into {0, 1}
    let mut v = sig_bytes[64];
    if v >= 27 {
        v -= 27;
    }
    if v > 1 {
        return Err(SignatureError::InvalidRecoveryId);
    }
    let recovery_id = RecoveryId::from_byte(v).ok_or(SignatureError::InvalidRecoveryId)?;

    let signature =
        Signature::from_slice(&sig_bytes[..64]).map_err(|_| SignatureError::RecoveryFailed)?;

    let hash = eip191_hash(message);
    let verifying_key = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    // Ethereum address = last 20 bytes of keccak256(uncompressed pubkey)
    let point = verifying_key.to_encoded_point(false);
    Ok(Address::from_raw_public_key(&point.as_bytes()[1..]))
}

/// Check whether `signature_hex` over `message` was produced by the key
/// controlling `claimed_address`. Address comparison is case-insensitive.
pub fn verify_personal_sign(
    claimed_address: &str,
    message: &str,
    signature_hex: &str,
) -> Result<bool, SignatureError> {
    let recovered = recover_address(message, signature_hex)?;
    let recovered_hex = format!("{recovered:#x}");
    Ok(recovered_hex.eq_ignore_ascii_case(claimed_address.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    fn test_key() -> SigningKey {
        SigningKey::from_slice(&[0x42u8; 32]).unwrap()
    }

    fn address_of(key: &SigningKey) -> String {
        let point = key.verifying_key().to_encoded_point(false);
        format!(
            "{:#x}",
            Address::from_raw_public_key(&point.as_bytes()[1..])
        )
    }

    /// Sign a message the way a wallet would: 65 bytes, v in {27, 28}.
    fn personal_sign(key: &SigningKey, message: &str) -> String {
        let hash = eip191_hash(message);
        let (signature, recovery_id) = key.sign_prehash_recoverable(hash.as_slice()).unwrap();

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(signature.to_bytes().as_slice());
        bytes[64] = recovery_id.to_byte() + 27;
        format!("0x{}", alloy::hex::encode(bytes))
    }

    #[test]
    fn valid_signature_verifies() {
        let key = test_key();
        let message = "Sign this message to log in to AgentPay: 1700000000";
        let signature = personal_sign(&key, message);

        let ok = verify_personal_sign(&address_of(&key), message, &signature).unwrap();
        assert!(ok);
    }

    #[test]
    fn address_comparison_is_case_insensitive() {
        let key = test_key();
        let message = "hello";
        let signature = personal_sign(&key, message);

        let upper = address_of(&key).to_uppercase().replace("0X", "0x");
        assert!(verify_personal_sign(&upper, message, &signature).unwrap());
    }

    #[test]
    fn wrong_address_does_not_verify() {
        let key = test_key();
        let message = "hello";
        let signature = personal_sign(&key, message);

        let other = "0x0000000000000000000000000000000000000001";
        assert!(!verify_personal_sign(other, message, &signature).unwrap());
    }

    #[test]
    fn tampered_message_recovers_different_address() {
        let key = test_key();
        let signature = personal_sign(&key, "hello");

        assert!(!verify_personal_sign(&address_of(&key), "hullo", &signature).unwrap());
    }

    #[test]
    fn short_signature_is_rejected() {
        let result = recover_address("hello", "0xdeadbeef");
        assert_eq!(result.unwrap_err(), SignatureError::InvalidSignatureLength(4));
    }

    #[test]
    fn out_of_range_recovery_id_is_rejected() {
        let key = test_key();
        let mut sig = alloy::hex::decode(personal_sign(&key, "hello").trim_start_matches("0x"))
            .unwrap();
        sig[64] = 29; // normalizes to 2, out of range
        let result = recover_address("hello", &alloy::hex::encode(sig));
        assert_eq!(result.unwrap_err(), SignatureError::InvalidRecoveryId);
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        let result = recover_address("hello", "not hex at all");
        assert!(matches!(
            result,
            Err(SignatureError::InvalidSignatureHex(_))
        ));
    }
}
