// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodial account and off-chain balance endpoints.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    state::AppState,
    storage::{AccountResponse, BalanceRepository, OffChainBalance},
};

/// Off-chain balances of the caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct BalancesResponse {
    pub balances: Vec<OffChainBalance>,
}

/// Get the caller's custodial account, creating it on first use.
#[utoipa::path(
    get,
    path = "/v1/account",
    tag = "Account",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Custodial account", body = AccountResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_account(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.settlement.custodial_account(&user.user_id)?;
    Ok(Json(account.into()))
}

/// List the caller's off-chain reward balances.
#[utoipa::path(
    get,
    path = "/v1/balances",
    tag = "Account",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Off-chain balances", body = BalancesResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_balances(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<BalancesResponse>, ApiError> {
    let balances = BalanceRepository::new(state.ledger()).list(&user.user_id)?;
    Ok(Json(BalancesResponse { balances }))
}
