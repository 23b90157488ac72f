// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Wallet-login endpoints: challenge issuance and signature verification.

use std::str::FromStr;

use alloy::primitives::Address;
use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{self, issue_session, verify_personal_sign, SignatureError};
use crate::error::ApiError;
use crate::state::AppState;

/// Request for a login challenge.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    /// Wallet address that intends to log in
    pub wallet_address: String,
}

/// A login challenge to be signed with `personal_sign`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    /// The exact message to sign
    pub nonce: String,
    /// Normalized wallet address
    pub wallet_address: String,
    /// Timestamp embedded in the challenge (Unix seconds)
    pub timestamp: i64,
}

/// Issue a login challenge embedding the current timestamp.
#[utoipa::path(
    post,
    path = "/v1/auth/wallet",
    tag = "Auth",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Challenge issued", body = ChallengeResponse),
        (status = 400, description = "Invalid wallet address")
    )
)]
pub async fn wallet_challenge(
    Json(req): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let wallet_address = normalize_address(&req.wallet_address)?;
    let timestamp = Utc::now().timestamp();

    Ok(Json(ChallengeResponse {
        nonce: auth::challenge_message(timestamp),
        wallet_address,
        timestamp,
    }))
}

/// Signature verification request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub wallet_address: String,
    /// The challenge message that was signed
    pub message: String,
    /// 65-byte personal-sign signature, hex
    pub signature: String,
}

/// A successful login.
#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    /// Bearer token for subsequent requests
    pub token: String,
    pub wallet_address: String,
}

/// Verify a signed challenge and issue a session token.
///
/// The challenge's embedded timestamp is checked against the freshness
/// window before the signature is trusted, blocking replay of captured
/// signatures.
#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    tag = "Auth",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Login successful", body = VerifyResponse),
        (status = 400, description = "Malformed address or challenge"),
        (status = 401, description = "Expired challenge or invalid signature")
    )
)]
pub async fn verify_signature(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let wallet_address = normalize_address(&req.wallet_address)?;

    let timestamp = auth::parse_challenge_timestamp(&req.message).ok_or_else(|| {
        ApiError::bad_request("invalid_challenge", "Malformed challenge message")
    })?;
    if !auth::challenge_is_fresh(timestamp, Utc::now().timestamp()) {
        return Err(ApiError::unauthorized(
            "challenge_expired",
            "Signature expired, please request a new challenge",
        ));
    }

    let valid = verify_personal_sign(&wallet_address, &req.message, &req.signature)
        .map_err(signature_error)?;
    if !valid {
        return Err(ApiError::unauthorized(
            "invalid_signature",
            "Signature does not match the wallet address",
        ));
    }

    let token = issue_session(&wallet_address, &state.config.jwt_secret)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(VerifyResponse {
        token,
        wallet_address,
    }))
}

fn normalize_address(raw: &str) -> Result<String, ApiError> {
    Address::from_str(raw.trim())
        .map(|a| format!("{a:#x}"))
        .map_err(|_| ApiError::bad_request("invalid_address", "Invalid wallet address format"))
}

fn signature_error(e: SignatureError) -> ApiError {
    ApiError::unauthorized("invalid_signature", e.to_string())
}
