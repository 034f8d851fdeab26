// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chapter and content unlock endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    chain::{Destination, PaymentLeg},
    error::ApiError,
    models::{Currency, PaymentType},
    settlement::{SignedUnlockRequest, UnlockOutcome, UnlockRequest},
    state::AppState,
    storage::{is_valid_key_part, PaymentRecord, UnlockRecord},
};

/// Request to pay for an unlock.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUnlockRequest {
    pub content_id: String,
    pub chapter_id: String,
    pub payment_type: PaymentType,
    pub currency: Currency,
    /// Pay from this wallet instead of the custodial account. The response
    /// then carries the unsigned message for the wallet to sign.
    #[serde(default)]
    pub payer_address: Option<String>,
}

/// Payer signature over a message returned by `POST /v1/unlocks`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitSignedUnlockRequest {
    pub content_id: String,
    pub chapter_id: String,
    pub payment_type: PaymentType,
    /// Base58 signature of the returned message
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnlockStatus {
    AlreadyUnlocked,
    Settled,
    AwaitingSignature,
}

/// One leg of a split payment.
#[derive(Debug, Serialize, ToSchema)]
pub struct LegResponse {
    /// Recipient wallet address, or `"burn"`
    pub destination: String,
    pub amount: u64,
}

impl From<&PaymentLeg> for LegResponse {
    fn from(leg: &PaymentLeg) -> Self {
        let destination = match leg.destination {
            Destination::Account(address) => address.to_string(),
            Destination::Burn => "burn".to_string(),
        };
        Self {
            destination,
            amount: leg.amount,
        }
    }
}

/// Unsigned payment for an external wallet.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingSignatureResponse {
    /// Base64 serialized transaction message
    pub message: String,
    pub payer_address: String,
    pub amount: u64,
    pub decimals: u8,
    pub legs: Vec<LegResponse>,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnlockResponse {
    pub status: UnlockStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock: Option<UnlockRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingSignatureResponse>,
}

/// Access state of one chapter for the caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccessResponse {
    pub content_id: String,
    pub chapter_id: String,
    pub unlocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock: Option<UnlockRecord>,
}

/// Pay for a chapter or a whole-content unlock.
///
/// Custodial payments are signed, submitted and recorded in one call. With
/// `payer_address` set, nothing is submitted and the unsigned message is
/// returned instead.
#[utoipa::path(
    post,
    path = "/v1/unlocks",
    tag = "Unlocks",
    request_body = CreateUnlockRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Already unlocked, nothing charged", body = UnlockResponse),
        (status = 201, description = "Payment confirmed and recorded", body = UnlockResponse),
        (status = 202, description = "Awaiting external signature", body = UnlockResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Content or chapter not found"),
        (status = 409, description = "Unlock already in progress"),
        (status = 422, description = "Payment type not accepted or insufficient funds"),
        (status = 500, description = "Confirmed but not recorded"),
        (status = 503, description = "Chain or price source unavailable")
    )
)]
pub async fn create_unlock(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateUnlockRequest>,
) -> Result<(StatusCode, Json<UnlockResponse>), ApiError> {
    validate_ids(&request.content_id, &request.chapter_id)?;

    let outcome = state
        .settlement
        .unlock(UnlockRequest {
            user_id: user.user_id,
            content_id: request.content_id,
            chapter_id: request.chapter_id,
            payment_type: request.payment_type,
            currency: request.currency,
            external_payer: request.payer_address,
        })
        .await?;

    let (status, response) = unlock_response(outcome);
    Ok((status, Json(response)))
}

/// Submit the payer's signature for a pending external unlock.
///
/// The signature must cover the message quoted by `POST /v1/unlocks` for the
/// same chapter. The transaction is submitted and, once confirmed, the unlock
/// is recorded exactly as for a custodial payment.
#[utoipa::path(
    post,
    path = "/v1/unlocks/signed",
    tag = "Unlocks",
    request_body = SubmitSignedUnlockRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Already unlocked, nothing submitted", body = UnlockResponse),
        (status = 201, description = "Payment confirmed and recorded", body = UnlockResponse),
        (status = 400, description = "Signature invalid or not from the payer"),
        (status = 404, description = "No pending payment for this chapter"),
        (status = 409, description = "Unlock in progress or earlier payment unreconciled"),
        (status = 504, description = "Submitted but not yet confirmed")
    )
)]
pub async fn submit_signed_unlock(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<SubmitSignedUnlockRequest>,
) -> Result<(StatusCode, Json<UnlockResponse>), ApiError> {
    validate_ids(&request.content_id, &request.chapter_id)?;
    if request.signature.trim().is_empty() {
        return Err(ApiError::bad_request("signature is required"));
    }

    let outcome = state
        .settlement
        .submit_signed_unlock(SignedUnlockRequest {
            user_id: user.user_id,
            content_id: request.content_id,
            chapter_id: request.chapter_id,
            payment_type: request.payment_type,
            signature: request.signature,
        })
        .await?;

    let (status, response) = unlock_response(outcome);
    Ok((status, Json(response)))
}

fn validate_ids(content_id: &str, chapter_id: &str) -> Result<(), ApiError> {
    if content_id.trim().is_empty() || chapter_id.trim().is_empty() {
        return Err(ApiError::bad_request("content_id and chapter_id are required"));
    }
    if !is_valid_key_part(content_id) || !is_valid_key_part(chapter_id) {
        return Err(ApiError::bad_request(
            "content_id and chapter_id must not contain control characters",
        ));
    }
    Ok(())
}

fn unlock_response(outcome: UnlockOutcome) -> (StatusCode, UnlockResponse) {
    match outcome {
        UnlockOutcome::AlreadyUnlocked(unlock) => (
            StatusCode::OK,
            UnlockResponse {
                status: UnlockStatus::AlreadyUnlocked,
                unlock: Some(unlock),
                payment: None,
                pending: None,
            },
        ),
        UnlockOutcome::Settled { payment, unlock } => (
            StatusCode::CREATED,
            UnlockResponse {
                status: UnlockStatus::Settled,
                unlock: Some(unlock),
                payment: Some(payment),
                pending: None,
            },
        ),
        UnlockOutcome::AwaitingSignature(pending) => (
            StatusCode::ACCEPTED,
            UnlockResponse {
                status: UnlockStatus::AwaitingSignature,
                unlock: None,
                payment: None,
                pending: Some(PendingSignatureResponse {
                    message: pending.message_base64,
                    payer_address: pending.payer.to_string(),
                    amount: pending.amount,
                    decimals: pending.decimals,
                    legs: pending.legs.iter().map(LegResponse::from).collect(),
                    last_valid_block_height: pending.last_valid_block_height,
                }),
            },
        ),
    }
}

/// Check whether the caller can read a chapter.
#[utoipa::path(
    get,
    path = "/v1/unlocks/{content_id}/{chapter_id}",
    tag = "Unlocks",
    params(
        ("content_id" = String, Path, description = "Content ID"),
        ("chapter_id" = String, Path, description = "Chapter ID")
    ),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Access state", body = AccessResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_access(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path((content_id, chapter_id)): Path<(String, String)>,
) -> Result<Json<AccessResponse>, ApiError> {
    let unlock = state
        .settlement
        .access(&user.user_id, &content_id, &chapter_id)?;

    Ok(Json(AccessResponse {
        content_id,
        chapter_id,
        unlocked: unlock.is_some(),
        unlock,
    }))
}
