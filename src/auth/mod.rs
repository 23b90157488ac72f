// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Wallet-signature authentication.
//!
//! Login flow: the client requests a challenge containing a timestamp, signs
//! it with their wallet (EIP-191 `personal_sign`), and submits the signature.
//! The server checks challenge freshness, recovers the signer address, and
//! issues an HS256 session token. Agents authenticate with per-agent API keys
//! instead.

pub mod error;
pub mod session;
pub mod signature;

pub use error::AuthError;
pub use session::{
    generate_agent_key, hash_agent_key, issue_session, AdminAuth, AgentAuth, Auth, AuthedWallet,
};
pub use signature::{recover_address, verify_personal_sign, SignatureError};

/// Prefix of every login challenge message. The timestamp follows directly.
pub const CHALLENGE_PREFIX: &str = "Sign this message to log in to AgentPay: ";

/// Challenges older than this are rejected.
pub const MAX_CHALLENGE_AGE_SECS: i64 = 300;

/// Tolerated clock skew for challenges from the future.
pub const MAX_CHALLENGE_SKEW_SECS: i64 = 60;

/// Build the challenge message for a given Unix timestamp.
pub fn challenge_message(timestamp: i64) -> String {
    format!("{CHALLENGE_PREFIX}{timestamp}")
}

/// Extract the timestamp from a challenge message, if well-formed.
pub fn parse_challenge_timestamp(message: &str) -> Option<i64> {
    message.strip_prefix(CHALLENGE_PREFIX)?.parse().ok()
}

/// Whether a challenge timestamp is inside the freshness window.
///
/// Rejecting stale challenges blocks signature replay: a captured signature
/// stops being accepted once its embedded timestamp ages out, even though the
/// cryptographic recovery itself would still succeed.
pub fn challenge_is_fresh(timestamp: i64, now: i64) -> bool {
    now - timestamp <= MAX_CHALLENGE_AGE_SECS && timestamp - now <= MAX_CHALLENGE_SKEW_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_round_trips() {
        let message = challenge_message(1700000000);
        assert_eq!(parse_challenge_timestamp(&message), Some(1700000000));
    }

    #[test]
    fn malformed_challenge_has_no_timestamp() {
        assert_eq!(parse_challenge_timestamp("please sign in"), None);
        assert_eq!(
            parse_challenge_timestamp("Sign this message to log in to AgentPay: soon"),
            None
        );
    }

    #[test]
    fn freshness_window_bounds() {
        let now = 1_700_000_000;
        assert!(challenge_is_fresh(now, now));
        assert!(challenge_is_fresh(now - MAX_CHALLENGE_AGE_SECS, now));
        assert!(!challenge_is_fresh(now - MAX_CHALLENGE_AGE_SECS - 1, now));
        assert!(challenge_is_fresh(now + MAX_CHALLENGE_SKEW_SECS, now));
        assert!(!challenge_is_fresh(now + MAX_CHALLENGE_SKEW_SECS + 1, now));
    }

    #[test]
    fn stale_challenge_rejected_despite_valid_signature() {
        use k256::ecdsa::SigningKey;
        use k256::elliptic_curve::sec1::ToEncodedPoint;

        let key = SigningKey::from_slice(&[0x07u8; 32]).unwrap();
        let point = key.verifying_key().to_encoded_point(false);
        let address = format!(
            "{:#x}",
            alloy::primitives::Address::from_raw_public_key(&point.as_bytes()[1..])
        );

        let now = 1_700_000_000;
        let stale_ts = now - MAX_CHALLENGE_AGE_SECS - 60;
        let message = challenge_message(stale_ts);

        let hash = signature::eip191_hash(&message);
        let (sig, recid) = key.sign_prehash_recoverable(hash.as_slice()).unwrap();
        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(sig.to_bytes().as_slice());
        bytes[64] = recid.to_byte() + 27;
        let signature_hex = format!("0x{}", alloy::hex::encode(bytes));

        // The signature itself is cryptographically valid…
        assert!(verify_personal_sign(&address, &message, &signature_hex).unwrap());
        // …but the challenge is outside the freshness window.
        let ts = parse_challenge_timestamp(&message).unwrap();
        assert!(!challenge_is_fresh(ts, now));
    }
}
