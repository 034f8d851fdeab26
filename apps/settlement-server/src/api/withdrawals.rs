// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{
    auth::Auth,
    error::ApiError,
    settlement::{WithdrawalOutcome, WithdrawalRequest},
    state::AppState,
};

/// Move off-chain balance to the caller's custodial wallet.
///
/// The balance is debited only after the treasury transfer confirms.
#[utoipa::path(
    post,
    path = "/v1/withdrawals",
    tag = "Withdrawals",
    request_body = WithdrawalRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Withdrawal settled", body = WithdrawalOutcome),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Withdrawal already in progress"),
        (status = 422, description = "Below minimum or insufficient balance"),
        (status = 500, description = "Confirmed but not recorded"),
        (status = 503, description = "Treasury or chain unavailable, try later")
    )
)]
pub async fn create_withdrawal(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(mut request): Json<WithdrawalRequest>,
) -> Result<Json<WithdrawalOutcome>, ApiError> {
    request.user_id = user.user_id;
    let outcome = state.settlement.withdraw(request).await?;
    Ok(Json(outcome))
}
