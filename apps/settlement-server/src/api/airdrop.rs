// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{auth::Auth, error::ApiError, settlement::AirdropOutcome, state::AppState};

/// Claim the one-time platform token airdrop.
///
/// `balance_recorded: false` means the transfer confirmed but the off-chain
/// credit is queued for reconciliation.
#[utoipa::path(
    post,
    path = "/v1/airdrop/claim",
    tag = "Airdrop",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Airdrop transferred", body = AirdropOutcome),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Already claimed, cap reached or token account exists"),
        (status = 422, description = "Airdrop pool cannot pay fees"),
        (status = 500, description = "Confirmed but not recorded"),
        (status = 503, description = "Chain unavailable")
    )
)]
pub async fn claim_airdrop(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<AirdropOutcome>, ApiError> {
    let outcome = state.settlement.claim_airdrop(&user.user_id).await?;
    Ok(Json(outcome))
}
