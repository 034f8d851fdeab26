// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::chain::ChainError;
use crate::distribution::DistributionError;
use crate::settlement::SettlementError;
use crate::storage::LedgerError;
use crate::vault::VaultError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
    pub retryable: bool,
    /// Signature of the transaction the error is about
    pub signature: Option<String>,
}

/// JSON error body.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    error: String,
    error_code: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
            retryable: false,
            signature: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn unprocessable(error_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, error_code, message)
    }

    pub fn conflict(error_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, error_code, message)
    }

    pub fn internal(error_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error_code, message)
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code.to_string(),
            retryable: self.retryable,
            signature: self.signature,
        });
        (self.status, body).into_response()
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        let message = err.to_string();
        match err {
            SettlementError::Validation(_) => Self::bad_request(message),
            SettlementError::NotFound(_) => Self::not_found(message),
            SettlementError::PaymentTypeMismatch { .. } => {
                Self::unprocessable("payment_type_mismatch", message)
            }
            SettlementError::AlreadyClaimed => Self::conflict("already_claimed", message),
            SettlementError::ClaimCapReached => Self::conflict("claim_cap_reached", message),
            SettlementError::TokenAccountExists => {
                Self::conflict("token_account_exists", message)
            }
            SettlementError::RequestInFlight => Self::conflict("request_in_flight", message),
            SettlementError::OperatorReserveLow => {
                Self::unprocessable("operator_reserve_low", message)
            }
            SettlementError::InsufficientOnChainBalance { .. } => {
                Self::unprocessable("insufficient_onchain_balance", message)
            }
            SettlementError::InsufficientOffChainBalance { .. } => {
                Self::unprocessable("insufficient_offchain_balance", message)
            }
            SettlementError::BelowMinimum { .. } => Self::unprocessable("below_minimum", message),
            SettlementError::TreasuryInsufficient => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "treasury_insufficient", message)
                    .retryable()
            }
            SettlementError::Chain(chain) => chain.into(),
            SettlementError::Price(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "price_unavailable", message)
                    .retryable()
            }
            SettlementError::RecordingFailed { signature } => {
                let mut api = Self::internal(
                    "recording_failed",
                    "Payment confirmed on-chain but not yet recorded; it will be reconciled",
                );
                api.signature = Some(signature);
                api
            }
            SettlementError::ConfirmationUnknown { signature } => {
                let mut api = Self::new(
                    StatusCode::GATEWAY_TIMEOUT,
                    "confirmation_pending",
                    "Transaction submitted but not yet confirmed; it will be reconciled",
                );
                api.signature = Some(signature);
                api
            }
            SettlementError::SettlementPending { signature } => {
                let mut api = Self::conflict("settlement_pending", message);
                api.signature = Some(signature);
                api
            }
            SettlementError::Vault(vault) => vault.into(),
            SettlementError::Storage(storage) => storage.into(),
        }
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        let message = err.to_string();
        if err.is_transient() {
            return Self::new(StatusCode::SERVICE_UNAVAILABLE, "chain_unavailable", message)
                .retryable();
        }
        match err {
            ChainError::InvalidAddress(_) => Self::bad_request(message),
            ChainError::TransactionFailed(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "chain_rejected", message)
            }
            _ => Self::new(StatusCode::BAD_GATEWAY, "chain_error", message),
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        tracing::error!(error = %err, "Key vault failure");
        Self::internal("security_error", "Key material could not be processed")
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(what) => Self::not_found(format!("{what} not found")),
            other => {
                tracing::error!(error = %other, "Ledger failure");
                Self::internal("storage_error", "Ledger storage error")
            }
        }
    }
}

impl From<DistributionError> for ApiError {
    fn from(err: DistributionError) -> Self {
        match err {
            DistributionError::AlreadyDistributed(_) => {
                Self::conflict("already_distributed", err.to_string())
            }
            DistributionError::Storage(storage) => storage.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let (status, body) = body_of(ApiError::bad_request("bad data")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad data");
        assert_eq!(body["error_code"], "validation_error");
        assert!(body.get("retryable").is_none());
        assert!(body.get("signature").is_none());
    }

    #[tokio::test]
    async fn recording_failure_carries_signature() {
        let err: ApiError = SettlementError::RecordingFailed {
            signature: "5xSig".to_string(),
        }
        .into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error_code"], "recording_failed");
        assert_eq!(body["signature"], "5xSig");
    }

    #[tokio::test]
    async fn unknown_outcome_is_not_retryable_and_names_the_transaction() {
        let err: ApiError = SettlementError::ConfirmationUnknown {
            signature: "5xSig".to_string(),
        }
        .into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error_code"], "confirmation_pending");
        assert_eq!(body["signature"], "5xSig");
        assert!(body.get("retryable").is_none());

        let (status, body) = body_of(
            SettlementError::SettlementPending {
                signature: "5xSig".to_string(),
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error_code"], "settlement_pending");
        assert_eq!(body["signature"], "5xSig");

        let timeout: ApiError = SettlementError::Chain(ChainError::Timeout(240)).into();
        assert!(!timeout.retryable);
    }

    #[tokio::test]
    async fn treasury_and_transient_chain_errors_are_retryable() {
        let (status, body) = body_of(SettlementError::TreasuryInsufficient.into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error_code"], "treasury_insufficient");
        assert_eq!(body["retryable"], true);

        let (status, body) = body_of(SettlementError::Chain(ChainError::Expired).into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["retryable"], true);

        let rejected: ApiError =
            SettlementError::Chain(ChainError::TransactionFailed("0x1".into())).into();
        assert_eq!(rejected.status, StatusCode::BAD_GATEWAY);
        assert!(!rejected.retryable);
    }

    #[test]
    fn eligibility_errors_have_specific_codes() {
        let cases: Vec<(SettlementError, StatusCode, &str)> = vec![
            (SettlementError::AlreadyClaimed, StatusCode::CONFLICT, "already_claimed"),
            (SettlementError::ClaimCapReached, StatusCode::CONFLICT, "claim_cap_reached"),
            (SettlementError::RequestInFlight, StatusCode::CONFLICT, "request_in_flight"),
            (
                SettlementError::BelowMinimum { minimum: 10 },
                StatusCode::UNPROCESSABLE_ENTITY,
                "below_minimum",
            ),
            (
                SettlementError::InsufficientOffChainBalance {
                    requested: 2,
                    available: 1,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_offchain_balance",
            ),
        ];
        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status);
            assert_eq!(api.error_code, code);
        }
    }

    #[test]
    fn vault_errors_do_not_leak_details() {
        let api: ApiError = SettlementError::Vault(VaultError::KeyMismatch).into();
        assert_eq!(api.error_code, "security_error");
        assert!(!api.message.contains("address"));
    }
}
