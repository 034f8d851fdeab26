// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use folio_settlement_server::{
    api::router,
    auth::JwtVerifier,
    chain::{SolanaRpcClient, TokenRegistry},
    config::{load_keypair, Config, LogFormat, DEFAULT_LOG_FILTER},
    distribution::{DistributionRunner, DistributionScheduler},
    pricing::HttpPoolPriceSource,
    settlement::{PlatformWallets, SettlementService},
    state::AppState,
    storage::LedgerDb,
    vault::KeyVault,
};

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

async fn run(config: Config) -> Result<(), Box<dyn Error + Send + Sync>> {
    let vault = Arc::new(KeyVault::from_base64(&config.vault_master_key)?);
    let ledger = Arc::new(LedgerDb::open(&config.ledger_db_path)?);
    tracing::info!(path = %config.ledger_db_path.display(), "Ledger database opened");

    let wallets = PlatformWallets {
        treasury: load_keypair("TREASURY_KEYPAIR_PATH", &config.treasury_keypair_path)?,
        operator: load_keypair("OPERATOR_KEYPAIR_PATH", &config.operator_keypair_path)?,
        operations: config.operations_address,
    };

    let chain = Arc::new(SolanaRpcClient::new(config.solana_rpc_url.as_str()));
    let prices = Arc::new(HttpPoolPriceSource::new(config.price_pools.clone())?);
    let tokens = TokenRegistry::new(
        config.usdc_mint,
        config.platform_mint,
        config.platform_decimals,
    );

    let settlement = Arc::new(SettlementService::new(
        Arc::clone(&ledger),
        vault,
        chain,
        prices,
        tokens,
        wallets,
        config.settlement.clone(),
    ));
    let distribution = Arc::new(DistributionScheduler::new(
        ledger,
        config.distribution.clone(),
    ));
    let auth = JwtVerifier::new(config.jwt_secret.as_bytes(), config.jwt_issuer.as_deref());

    let shutdown = CancellationToken::new();
    let runner = DistributionRunner::new(Arc::clone(&distribution), config.distribution_interval);
    let runner_handle = tokio::spawn(runner.run(shutdown.clone()));

    let app = router(AppState::new(settlement, distribution, auth));
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Folio settlement server listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(err) = runner_handle.await {
        tracing::warn!(error = %err, "Distribution runner ended abnormally");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };
    init_tracing(config.log_format);
    tracing::info!(config = ?config, "Configuration loaded");

    if let Err(err) = run(config).await {
        tracing::error!(error = %err, "Server failed");
        std::process::exit(1);
    }
}
