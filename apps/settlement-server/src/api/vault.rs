// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key vault service boundary.
//!
//! A single call with an `action` discriminator and a `data` payload:
//!
//! - `encrypt`: `data` is the UTF-8 secret, the result is vault ciphertext
//! - `decrypt`: `data` is vault ciphertext, the result is the UTF-8 secret
//!
//! Misuse is answered with a structured 400. Failures never echo key
//! material or internal error detail.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{auth::AdminOnly, error::ApiError, state::AppState};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct VaultRequest {
    /// `encrypt` or `decrypt`
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VaultResponse {
    pub result: String,
}

fn vault_error(code: &'static str, message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, code, message)
}

/// Encrypt or decrypt a secret with the server master key.
#[utoipa::path(
    post,
    path = "/v1/vault",
    tag = "Vault",
    request_body = VaultRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Operation result", body = VaultResponse),
        (status = 400, description = "Missing or unknown action, missing data, or undecryptable payload"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Encryption failure")
    )
)]
pub async fn vault_call(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    body: Result<Json<VaultRequest>, JsonRejection>,
) -> Result<Json<VaultResponse>, ApiError> {
    let Json(request) =
        body.map_err(|_| vault_error("invalid_body", "Request body must be a JSON object"))?;

    let action = request
        .action
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| vault_error("missing_action", "Field `action` is required"))?;
    let data = request
        .data
        .ok_or_else(|| vault_error("missing_data", "Field `data` is required"))?;

    let result = match action.as_str() {
        "encrypt" => state.vault().encrypt(data.as_bytes())?,
        "decrypt" => {
            let plaintext = state
                .vault()
                .decrypt(&data)
                .map_err(|_| vault_error("decryption_failed", "Payload could not be decrypted"))?;
            String::from_utf8(plaintext).map_err(|_| {
                ApiError::unprocessable("binary_payload", "Decrypted secret is not UTF-8 text")
            })?
        }
        _ => {
            return Err(vault_error(
                "unknown_action",
                "Field `action` must be `encrypt` or `decrypt`",
            ))
        }
    };

    tracing::info!(admin = %admin.user_id, action = %action, "Vault call");
    Ok(Json(VaultResponse { result }))
}
