// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ErrorBody,
    models::{Currency, LockPolicy, PaymentType},
    settlement::{AirdropOutcome, WithdrawalOutcome, WithdrawalRequest},
    state::AppState,
    storage::{
        AccountResponse, Chapter, Content, Discrepancy, DiscrepancyCause, DistributionLog,
        OffChainBalance, PaymentRecord, PendingRecord, RecipientShare, Resolution, UnlockRecord,
    },
};

pub mod account;
pub mod admin;
pub mod airdrop;
pub mod health;
pub mod unlocks;
pub mod vault;
pub mod withdrawals;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/account", get(account::get_account))
        .route("/balances", get(account::list_balances))
        .route("/unlocks", post(unlocks::create_unlock))
        .route("/unlocks/signed", post(unlocks::submit_signed_unlock))
        .route("/unlocks/{content_id}/{chapter_id}", get(unlocks::get_access))
        .route("/airdrop/claim", post(airdrop::claim_airdrop))
        .route("/withdrawals", post(withdrawals::create_withdrawal))
        .route("/vault", post(vault::vault_call))
        .route("/admin/distributions/run", post(admin::run_distribution))
        .route("/admin/discrepancies", get(admin::list_discrepancies))
        .route(
            "/admin/discrepancies/{signature}/replay",
            post(admin::replay_discrepancy),
        )
        .route("/admin/contents/{content_id}", put(admin::upsert_content))
        .route(
            "/admin/contents/{content_id}/chapters/{chapter_id}",
            put(admin::upsert_chapter),
        )
        .route("/admin/rewards/scores", post(admin::add_score));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        account::get_account,
        account::list_balances,
        unlocks::create_unlock,
        unlocks::submit_signed_unlock,
        unlocks::get_access,
        airdrop::claim_airdrop,
        withdrawals::create_withdrawal,
        vault::vault_call,
        admin::run_distribution,
        admin::list_discrepancies,
        admin::replay_discrepancy,
        admin::upsert_content,
        admin::upsert_chapter,
        admin::add_score
    ),
    components(
        schemas(
            ErrorBody,
            Currency,
            PaymentType,
            LockPolicy,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            AccountResponse,
            OffChainBalance,
            account::BalancesResponse,
            unlocks::CreateUnlockRequest,
            unlocks::SubmitSignedUnlockRequest,
            unlocks::UnlockStatus,
            unlocks::UnlockResponse,
            unlocks::PendingSignatureResponse,
            unlocks::LegResponse,
            unlocks::AccessResponse,
            PaymentRecord,
            UnlockRecord,
            AirdropOutcome,
            WithdrawalRequest,
            WithdrawalOutcome,
            vault::VaultRequest,
            vault::VaultResponse,
            DistributionLog,
            RecipientShare,
            Discrepancy,
            DiscrepancyCause,
            Resolution,
            PendingRecord,
            Content,
            Chapter,
            admin::RunDistributionRequest,
            admin::DiscrepancyListResponse,
            admin::UpsertContentRequest,
            admin::UpsertChapterRequest,
            admin::AddScoreRequest,
            admin::ScoreResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Account", description = "Custodial account and off-chain balances"),
        (name = "Unlocks", description = "Paid chapter and content access"),
        (name = "Airdrop", description = "One-time platform token airdrop"),
        (name = "Withdrawals", description = "Off-chain balance withdrawals"),
        (name = "Vault", description = "Key vault service boundary"),
        (name = "Admin", description = "Distribution, reconciliation and catalog tooling")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::associated_token_address;
    use crate::state::test_support::TestApp;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SOL: u64 = 1_000_000_000;

    async fn send(
        app: &TestApp,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(app.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = TestApp::new();
        let _ = router(app.state.clone()).into_make_service();
    }

    #[tokio::test]
    async fn readiness_reports_ledger_and_chain() {
        let app = TestApp::new();
        let (status, body) = send(&app, "GET", "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["checks"]["ledger"], "ok");
        assert_eq!(body["checks"]["chain"], "ok");

        let (status, _) = send(&app, "GET", "/health/live", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn user_routes_require_a_token() {
        let app = TestApp::new();
        let (status, body) = send(&app, "GET", "/v1/account", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn account_is_created_on_first_call_without_secret() {
        let app = TestApp::new();
        let token = app.user_token("alice");

        let (status, first) = send(&app, "GET", "/v1/account", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(first.get("encrypted_secret").is_none());

        let (_, second) = send(&app, "GET", "/v1/account", Some(&token), None).await;
        assert_eq!(first["chain_address"], second["chain_address"]);
    }

    #[tokio::test]
    async fn unlock_then_access_check() {
        let app = TestApp::new();
        app.harness.fund_user("alice", SOL, Currency::Usdc, 1_000_000);
        let token = app.user_token("alice");

        let (status, body) = send(
            &app,
            "POST",
            "/v1/unlocks",
            Some(&token),
            Some(json!({
                "content_id": "novel-1",
                "chapter_id": "ch-1",
                "payment_type": "single",
                "currency": "USDC"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "settled");
        assert_eq!(body["payment"]["amount"], 300_000);

        let (status, body) =
            send(&app, "GET", "/v1/unlocks/novel-1/ch-1", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["unlocked"], true);

        let (_, body) = send(&app, "GET", "/v1/unlocks/novel-1/ch-2", Some(&token), None).await;
        assert_eq!(body["unlocked"], false);
    }

    #[tokio::test]
    async fn external_wallet_unlock_completes_with_a_signed_submit() {
        use base64ct::{Base64, Encoding};
        use solana_sdk::signature::{Keypair, Signer};

        let app = TestApp::new();
        let token = app.user_token("alice");
        let wallet = Keypair::new();
        app.harness.chain.set_native(wallet.pubkey(), SOL);

        let (status, body) = send(
            &app,
            "POST",
            "/v1/unlocks",
            Some(&token),
            Some(json!({
                "content_id": "novel-1",
                "chapter_id": "ch-1",
                "payment_type": "single",
                "currency": "SOL",
                "payer_address": wallet.pubkey().to_string()
            })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "awaiting_signature");
        let message = Base64::decode_vec(body["pending"]["message"].as_str().unwrap()).unwrap();

        let submit = |signature: String| {
            json!({
                "content_id": "novel-1",
                "chapter_id": "ch-1",
                "payment_type": "single",
                "signature": signature
            })
        };

        let stranger = Keypair::new();
        let (status, body) = send(
            &app,
            "POST",
            "/v1/unlocks/signed",
            Some(&token),
            Some(submit(stranger.sign_message(&message).to_string())),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "validation_error");

        let (status, body) = send(
            &app,
            "POST",
            "/v1/unlocks/signed",
            Some(&token),
            Some(submit(wallet.sign_message(&message).to_string())),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "settled");
        assert_eq!(body["payment"]["payer_address"], wallet.pubkey().to_string());

        let (_, body) = send(&app, "GET", "/v1/unlocks/novel-1/ch-1", Some(&token), None).await;
        assert_eq!(body["unlocked"], true);
    }

    #[tokio::test]
    async fn signed_unlock_without_a_quote_is_not_found() {
        use solana_sdk::signature::{Keypair, Signer};

        let app = TestApp::new();
        let token = app.user_token("alice");
        let (status, body) = send(
            &app,
            "POST",
            "/v1/unlocks/signed",
            Some(&token),
            Some(json!({
                "content_id": "novel-1",
                "chapter_id": "ch-1",
                "payment_type": "single",
                "signature": Keypair::new().sign_message(b"stale").to_string()
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "not_found");
    }

    #[tokio::test]
    async fn unlock_with_wrong_payment_type_is_unprocessable() {
        let app = TestApp::new();
        let token = app.user_token("alice");
        let (status, body) = send(
            &app,
            "POST",
            "/v1/unlocks",
            Some(&token),
            Some(json!({
                "content_id": "novel-1",
                "chapter_id": "ch-locked",
                "payment_type": "single",
                "currency": "USDC"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error_code"], "payment_type_mismatch");
    }

    #[tokio::test]
    async fn airdrop_claim_is_one_time() {
        let app = TestApp::new();
        app.harness.chain.set_native(app.harness.operator(), SOL);
        let token = app.user_token("alice");

        let (status, body) = send(&app, "POST", "/v1/airdrop/claim", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance_recorded"], true);

        let (status, body) = send(&app, "POST", "/v1/airdrop/claim", Some(&token), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error_code"], "already_claimed");

        let (_, body) = send(&app, "GET", "/v1/balances", Some(&token), None).await;
        assert_eq!(body["balances"][0]["currency"], "PLATFORM");
    }

    #[tokio::test]
    async fn withdrawal_below_minimum_is_rejected() {
        let app = TestApp::new();
        let token = app.user_token("alice");
        let (status, body) = send(
            &app,
            "POST",
            "/v1/withdrawals",
            Some(&token),
            Some(json!({ "currency": "PLATFORM", "amount": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error_code"], "below_minimum");
    }

    #[tokio::test]
    async fn withdrawal_after_airdrop_moves_balance() {
        let app = TestApp::new();
        let harness = &app.harness;
        harness.chain.set_native(harness.operator(), SOL);
        harness.chain.set_token_account(
            associated_token_address(&harness.treasury(), &harness.platform_mint),
            SOL,
        );
        let token = app.user_token("alice");
        send(&app, "POST", "/v1/airdrop/claim", Some(&token), None).await;

        let (status, body) = send(
            &app,
            "POST",
            "/v1/withdrawals",
            Some(&token),
            Some(json!({ "currency": "PLATFORM", "amount": 40_000_000u64 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["remaining_balance"], 60_000_000u64);
    }

    #[tokio::test]
    async fn vault_requires_admin_and_validates_input() {
        let app = TestApp::new();
        let user = app.user_token("alice");
        let admin = app.admin_token();

        let (status, _) = send(
            &app,
            "POST",
            "/v1/vault",
            Some(&user),
            Some(json!({ "action": "encrypt", "data": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        for (body, code) in [
            (json!({ "data": "x" }), "missing_action"),
            (json!({ "action": "encrypt" }), "missing_data"),
            (json!({ "action": "rotate", "data": "x" }), "unknown_action"),
            (json!({ "action": "decrypt", "data": "not-a-ciphertext" }), "decryption_failed"),
        ] {
            let (status, response) = send(&app, "POST", "/v1/vault", Some(&admin), Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response["error_code"], code);
        }
    }

    #[tokio::test]
    async fn vault_round_trips_secrets() {
        let app = TestApp::new();
        let admin = app.admin_token();

        let (status, sealed) = send(
            &app,
            "POST",
            "/v1/vault",
            Some(&admin),
            Some(json!({ "action": "encrypt", "data": "seed words" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let ciphertext = sealed["result"].as_str().unwrap().to_string();
        assert_ne!(ciphertext, "seed words");

        let (status, opened) = send(
            &app,
            "POST",
            "/v1/vault",
            Some(&admin),
            Some(json!({ "action": "decrypt", "data": ciphertext })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(opened["result"], "seed words");
    }

    #[tokio::test]
    async fn admin_distribution_runs_once_per_period() {
        let app = TestApp::new();
        let admin = app.admin_token();

        for (user_id, points) in [("alice", 30), ("bob", 10)] {
            let (status, _) = send(
                &app,
                "POST",
                "/v1/admin/rewards/scores",
                Some(&admin),
                Some(json!({ "user_id": user_id, "points": points })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let run = json!({ "period": "2026-W41" });
        let (status, log) = send(
            &app,
            "POST",
            "/v1/admin/distributions/run",
            Some(&admin),
            Some(run.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(log["recipient_count"], 2);
        assert_eq!(log["recipients"][0]["user_id"], "alice");

        let (status, body) = send(
            &app,
            "POST",
            "/v1/admin/distributions/run",
            Some(&admin),
            Some(run),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error_code"], "already_distributed");

        let (status, _) = send(
            &app,
            "POST",
            "/v1/admin/distributions/run",
            Some(&admin),
            Some(json!({ "period": "last-week" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_routes_reject_clients() {
        let app = TestApp::new();
        let user = app.user_token("alice");
        let (status, body) =
            send(&app, "GET", "/v1/admin/discrepancies", Some(&user), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error_code"], "insufficient_permissions");
    }

    #[tokio::test]
    async fn catalog_upserts_validate_addresses_and_parents() {
        let app = TestApp::new();
        let admin = app.admin_token();

        let (status, _) = send(
            &app,
            "PUT",
            "/v1/admin/contents/manga-9",
            Some(&admin),
            Some(json!({ "title": "Nine", "author_address": "not-base58!" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "PUT",
            "/v1/admin/contents/manga-9/chapters/ch-1",
            Some(&admin),
            Some(json!({ "lock_policy": "free" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let author = app.harness.author.to_string();
        let (status, _) = send(
            &app,
            "PUT",
            "/v1/admin/contents/manga-9",
            Some(&admin),
            Some(json!({ "title": "Nine", "author_address": author })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "PUT",
            "/v1/admin/contents/manga-9/chapters/ch-1",
            Some(&admin),
            Some(json!({ "lock_policy": "free" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lock_policy"], "free");
    }

    #[tokio::test]
    async fn ids_with_control_characters_are_rejected() {
        let app = TestApp::new();
        let admin = app.admin_token();
        let author = app.harness.author.to_string();

        let (status, _) = send(
            &app,
            "PUT",
            "/v1/admin/contents/manga%0A9",
            Some(&admin),
            Some(json!({ "title": "Nine", "author_address": author })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "PUT",
            "/v1/admin/contents/novel-1/chapters/ch%001",
            Some(&admin),
            Some(json!({ "lock_policy": "free" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/v1/admin/rewards/scores",
            Some(&admin),
            Some(json!({ "user_id": "ali\u{0}ce", "points": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let token = app.user_token("alice");
        let (status, _) = send(
            &app,
            "POST",
            "/v1/unlocks",
            Some(&token),
            Some(json!({
                "content_id": "novel-1",
                "chapter_id": "ch\u{1f}1",
                "payment_type": "single",
                "currency": "USDC"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_discrepancy_replay_is_not_found() {
        let app = TestApp::new();
        let admin = app.admin_token();
        let (status, body) = send(
            &app,
            "POST",
            "/v1/admin/discrepancies/missing/replay",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "not_found");
    }
}
