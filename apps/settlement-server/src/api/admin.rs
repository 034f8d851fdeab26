// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints for operating the settlement service.
//!
//! These endpoints require the Admin role and provide:
//! - Manual reward distribution runs
//! - Discrepancy listing and replay
//! - Catalog maintenance (payout addresses, chapter lock policies)
//! - Reader score ingestion

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::AdminOnly,
    chain::parse_address,
    distribution::{period_key, period_start},
    error::ApiError,
    models::LockPolicy,
    state::AppState,
    storage::{
        is_valid_key_part, CatalogRepository, Chapter, Content, Discrepancy, DistributionLog,
        DistributionRepository,
    },
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RunDistributionRequest {
    /// ISO week key such as `2026-W41`; defaults to the previous week
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DiscrepancyQuery {
    /// Include already replayed entries
    #[serde(default)]
    pub include_resolved: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscrepancyListResponse {
    pub discrepancies: Vec<Discrepancy>,
    pub total: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertContentRequest {
    pub title: String,
    /// Wallet receiving the author share
    pub author_address: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertChapterRequest {
    pub lock_policy: LockPolicy,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddScoreRequest {
    pub user_id: String,
    pub points: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreResponse {
    pub user_id: String,
    /// Score accumulated in the current period
    pub score: u64,
}

// ============================================================================
// Distributions
// ============================================================================

/// Distribute the reward pool for one period.
#[utoipa::path(
    post,
    path = "/v1/admin/distributions/run",
    tag = "Admin",
    request_body = RunDistributionRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Period distributed", body = DistributionLog),
        (status = 400, description = "Period is not an ISO week key"),
        (status = 403, description = "Admin role required"),
        (status = 409, description = "Period already distributed")
    )
)]
pub async fn run_distribution(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<RunDistributionRequest>,
) -> Result<Json<DistributionLog>, ApiError> {
    let period = match request.period {
        Some(period) if period_start(&period).is_none() => {
            return Err(ApiError::bad_request("period must be an ISO week such as 2026-W41"))
        }
        Some(period) => period,
        None => period_key(Utc::now() - chrono::Duration::weeks(1)),
    };

    tracing::info!(admin = %admin.user_id, period = %period, "Manual distribution run");
    let log = state.distribution.run_period(&period)?;
    Ok(Json(log))
}

// ============================================================================
// Discrepancies
// ============================================================================

/// List transactions whose ledger write failed or whose outcome is unknown.
#[utoipa::path(
    get,
    path = "/v1/admin/discrepancies",
    tag = "Admin",
    params(DiscrepancyQuery),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Discrepancies", body = DiscrepancyListResponse),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn list_discrepancies(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<DiscrepancyQuery>,
) -> Result<Json<DiscrepancyListResponse>, ApiError> {
    let discrepancies = state.settlement.discrepancies(query.include_resolved)?;
    Ok(Json(DiscrepancyListResponse {
        total: discrepancies.len(),
        discrepancies,
    }))
}

/// Reconcile one parked transaction.
///
/// Confirmed transactions get their ledger writes applied. An unconfirmed
/// transaction whose blockhash has expired is closed without writes.
#[utoipa::path(
    post,
    path = "/v1/admin/discrepancies/{signature}/replay",
    tag = "Admin",
    params(("signature" = String, Path, description = "Transaction signature")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Discrepancy resolved", body = Discrepancy),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Unknown signature"),
        (status = 409, description = "Transaction may still land")
    )
)]
pub async fn replay_discrepancy(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(signature): Path<String>,
) -> Result<Json<Discrepancy>, ApiError> {
    tracing::info!(admin = %admin.user_id, signature = %signature, "Replaying discrepancy");
    let resolved = state.settlement.replay_recording(&signature).await?;
    Ok(Json(resolved))
}

// ============================================================================
// Catalog
// ============================================================================

/// Create or update a content's title and payout address.
#[utoipa::path(
    put,
    path = "/v1/admin/contents/{content_id}",
    tag = "Admin",
    params(("content_id" = String, Path, description = "Content ID")),
    request_body = UpsertContentRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Content stored", body = Content),
        (status = 400, description = "Invalid content id or author address"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn upsert_content(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
    Path(content_id): Path<String>,
    Json(request): Json<UpsertContentRequest>,
) -> Result<Json<Content>, ApiError> {
    check_key_part("content_id", &content_id)?;
    parse_address(&request.author_address)?;

    let content = Content {
        content_id,
        title: request.title,
        author_address: request.author_address,
    };
    CatalogRepository::new(state.ledger()).upsert_content(&content)?;
    tracing::info!(content_id = %content.content_id, "Content upserted");
    Ok(Json(content))
}

/// Set a chapter's lock policy.
#[utoipa::path(
    put,
    path = "/v1/admin/contents/{content_id}/chapters/{chapter_id}",
    tag = "Admin",
    params(
        ("content_id" = String, Path, description = "Content ID"),
        ("chapter_id" = String, Path, description = "Chapter ID")
    ),
    request_body = UpsertChapterRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Chapter stored", body = Chapter),
        (status = 400, description = "Invalid id"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Content not found")
    )
)]
pub async fn upsert_chapter(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
    Path((content_id, chapter_id)): Path<(String, String)>,
    Json(request): Json<UpsertChapterRequest>,
) -> Result<Json<Chapter>, ApiError> {
    check_key_part("content_id", &content_id)?;
    check_key_part("chapter_id", &chapter_id)?;
    let catalog = CatalogRepository::new(state.ledger());
    if catalog.get_content(&content_id)?.is_none() {
        return Err(ApiError::not_found(format!("content {content_id} not found")));
    }

    let chapter = Chapter {
        content_id,
        chapter_id,
        lock_policy: request.lock_policy,
    };
    catalog.upsert_chapter(&chapter)?;
    Ok(Json(chapter))
}

// ============================================================================
// Reward scores
// ============================================================================

/// Add reading points to a user's score for the running period.
#[utoipa::path(
    post,
    path = "/v1/admin/rewards/scores",
    tag = "Admin",
    request_body = AddScoreRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Updated score", body = ScoreResponse),
        (status = 400, description = "Missing user id"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn add_score(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<AddScoreRequest>,
) -> Result<Json<ScoreResponse>, ApiError> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("user_id is required"));
    }
    check_key_part("user_id", &request.user_id)?;

    let score =
        DistributionRepository::new(state.ledger()).add_score(&request.user_id, request.points)?;
    Ok(Json(ScoreResponse {
        user_id: request.user_id,
        score,
    }))
}

fn check_key_part(field: &str, value: &str) -> Result<(), ApiError> {
    if is_valid_key_part(value) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "{field} must be non-empty and free of control characters"
        )))
    }
}
