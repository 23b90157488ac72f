// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! Login sessions and request extractors.
//!
//! A successful wallet-signature login is exchanged for an HS256 JWT whose
//! subject is the (lowercased) wallet address. Handlers require it with the
//! [`Auth`] extractor:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user.wallet is the authenticated wallet address
//! }
//! ```
//!
//! Agents authenticate with a per-agent API key in the `X-Agent-Key` header
//! ([`AgentAuth`]); admin endpoints compare a bearer token against the
//! configured `ADMIN_TOKEN` ([`AdminAuth`]).

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::state::AppState;

/// Session lifetime: 7 days.
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Claims carried by a login session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Wallet address (lowercase hex).
    pub sub: String,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expiration (Unix seconds).
    pub exp: i64,
}

/// Issue a session token for a verified wallet.
pub fn issue_session(wallet: &str, secret: &str) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let claims = SessionClaims {
        sub: wallet.to_ascii_lowercase(),
        iat: now,
        exp: now + SESSION_TTL_SECS,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::InternalError(e.to_string()))
}

/// Decode and validate a session token.
pub fn decode_session(token: &str, secret: &str) -> Result<SessionClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;

    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        _ => AuthError::MalformedToken,
    })
}

/// The authenticated wallet behind a request.
#[derive(Debug, Clone)]
pub struct AuthedWallet {
    /// Wallet address, lowercase hex.
    pub wallet: String,
}

/// Extractor requiring a valid login session.
pub struct Auth(pub AuthedWallet);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = decode_session(token, &state.config.jwt_secret)?;
        Ok(Auth(AuthedWallet { wallet: claims.sub }))
    }
}

/// Extractor requiring a valid agent API key; yields the agent id.
pub struct AgentAuth(pub u64);

impl FromRequestParts<AppState> for AgentAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get("x-agent-key")
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let agent_id = state
            .ledger
            .resolve_agent_key(&hash_agent_key(key))
            .map_err(|e| AuthError::InternalError(e.to_string()))?
            .ok_or(AuthError::InvalidAgentKey)?;

        Ok(AgentAuth(agent_id))
    }
}

/// Extractor requiring the configured admin bearer token.
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .config
            .admin_token
            .as_deref()
            .ok_or(AuthError::AdminNotConfigured)?;

        let token = bearer_token(parts)?;
        if token != expected {
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(AdminAuth)
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)
}

// =============================================================================
// Agent API keys
// =============================================================================

/// Mint a fresh agent API key (32 random bytes, hex).
pub fn generate_agent_key() -> String {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 32];
    // rand failure here means the system CSPRNG is broken; nothing sane to do
    rng.fill(&mut bytes).expect("system RNG failure");
    alloy::hex::encode(bytes)
}

/// SHA-256 digest of an API key, hex. Only the digest is ever stored.
pub fn hash_agent_key(key: &str) -> String {
    let hash = digest::digest(&digest::SHA256, key.as_bytes());
    alloy::hex::encode(hash.as_ref())
}
