// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 AgentPay

//! API-facing error type.
//!
//! Every user-visible failure carries a stable `error_code` plus a
//! human-readable message. Core errors map onto codes here so handlers can
//! just use `?`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::custody::{CustodyError, PoolError};
use crate::ledger::LedgerError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let message = e.to_string();
        match e {
            LedgerError::InvalidAmount => Self::bad_request("invalid_amount", message),
            LedgerError::InsufficientBalance => {
                Self::bad_request("insufficient_balance", message)
            }
            LedgerError::BelowMinimum => Self::bad_request("below_minimum", message),
            LedgerError::RewardTypeDisabled => {
                Self::bad_request("reward_type_disabled", message)
            }
            LedgerError::DailyLimitReached => Self::bad_request("daily_limit_reached", message),
            LedgerError::GlobalCapReached => Self::bad_request("global_cap_reached", message),
            LedgerError::PoolNotFound => Self::bad_request("pool_not_found", message),
            LedgerError::PoolBalanceLow => Self::bad_request("pool_balance_low", message),
            LedgerError::InsufficientPoolBalance => {
                Self::bad_request("insufficient_pool_balance", message)
            }
            LedgerError::NotFound(_) => Self::not_found(message),
            // Storage/serde/arithmetic failures are not the caller's fault
            _ => Self::internal(message),
        }
    }
}

impl From<CustodyError> for ApiError {
    fn from(e: CustodyError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<PoolError> for ApiError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Custody(inner) => inner.into(),
            PoolError::Ledger(inner) => inner.into(),
        }
    }
}
