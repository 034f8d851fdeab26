// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Everything is read once from the environment at startup and validated
//! before the server binds. A missing or malformed required value aborts
//! startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `VAULT_MASTER_KEY` | Base64 32-byte key sealing custodial secrets | Required |
//! | `SOLANA_RPC_URL` | Solana JSON-RPC endpoint | Required |
//! | `JWT_SECRET` | HS256 secret for bearer tokens | Required |
//! | `JWT_ISSUER` | Expected `iss` claim | Optional |
//! | `PLATFORM_MINT` | Platform token mint address | Required |
//! | `PLATFORM_DECIMALS` | Platform token decimals | `6` |
//! | `USDC_MINT` | USDC mint address | mainnet USDC |
//! | `TREASURY_KEYPAIR_PATH` | Treasury keypair (JSON byte array) | Required |
//! | `OPERATOR_KEYPAIR_PATH` | Airdrop operator keypair | Required |
//! | `OPERATIONS_ADDRESS` | Operations share recipient | Required |
//! | `PRICE_POOL_URL_SOL` | SOL/USD pool reserves endpoint | Optional |
//! | `PRICE_POOL_URL_PLATFORM` | Platform/USD pool reserves endpoint | Optional |
//! | `PRICE_SINGLE_MICRO_USD` | Single chapter price | `300000` |
//! | `PRICE_BUNDLE_MICRO_USD` | Bundle price | `4990000` |
//! | `PRICE_SUBSCRIPTION_MICRO_USD` | Subscription price | `9990000` |
//! | `FEE_RESERVE_LAMPORTS` | Lamports a payer must keep | `5000000` |
//! | `OPERATOR_RESERVE_LAMPORTS` | Lamports the operator must hold | `50000000` |
//! | `AIRDROP_AMOUNT` | Platform minor units per claim | `100000000` |
//! | `AIRDROP_CAP` | Maximum number of claims | `10000` |
//! | `WITHDRAW_MINIMUM` | Minimum withdrawal, minor units | `10000000` |
//! | `REWARD_POOL_AMOUNT` | Weekly reward pool, minor units | `5000000` |
//! | `REWARD_TOP_N` | Ranked recipients per week | `10` |
//! | `DISTRIBUTION_INTERVAL_SECS` | Distribution runner tick | `3600` |
//! | `LEDGER_DB_PATH` | redb ledger file | `/data/ledger.redb` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use url::Url;

use crate::chain::USDC_MAINNET_MINT;
use crate::distribution::DistributionConfig;
use crate::models::Currency;
use crate::settlement::{SettlementConfig, UnlockPrices};

pub const DEFAULT_LEDGER_DB_PATH: &str = "/data/ledger.redb";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Validated startup configuration.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub ledger_db_path: PathBuf,
    pub vault_master_key: String,
    pub solana_rpc_url: Url,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub usdc_mint: Pubkey,
    pub platform_mint: Pubkey,
    pub platform_decimals: u8,
    pub treasury_keypair_path: PathBuf,
    pub operator_keypair_path: PathBuf,
    pub operations_address: Pubkey,
    pub price_pools: HashMap<Currency, String>,
    pub settlement: SettlementConfig,
    pub distribution: DistributionConfig,
    pub distribution_interval: Duration,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ledger_db_path", &self.ledger_db_path)
            .field("solana_rpc_url", &self.solana_rpc_url.as_str())
            .field("platform_mint", &self.platform_mint)
            .field("operations_address", &self.operations_address)
            .field("vault_master_key", &"<redacted>")
            .field("jwt_secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup: &lookup };

        let solana_rpc_url = env.required("SOLANA_RPC_URL")?;
        let solana_rpc_url = Url::parse(&solana_rpc_url).map_err(|e| ConfigError::Invalid {
            name: "SOLANA_RPC_URL",
            reason: e.to_string(),
        })?;

        let platform_decimals = env.parsed_or("PLATFORM_DECIMALS", 6u8)?;
        let defaults = SettlementConfig::default();

        let settlement = SettlementConfig {
            prices: UnlockPrices {
                single: env.parsed_or("PRICE_SINGLE_MICRO_USD", defaults.prices.single)?,
                bundle: env.parsed_or("PRICE_BUNDLE_MICRO_USD", defaults.prices.bundle)?,
                subscription: env
                    .parsed_or("PRICE_SUBSCRIPTION_MICRO_USD", defaults.prices.subscription)?,
            },
            fee_reserve_lamports: env
                .parsed_or("FEE_RESERVE_LAMPORTS", defaults.fee_reserve_lamports)?,
            operator_reserve_lamports: env
                .parsed_or("OPERATOR_RESERVE_LAMPORTS", defaults.operator_reserve_lamports)?,
            airdrop_amount: env.parsed_or("AIRDROP_AMOUNT", defaults.airdrop_amount)?,
            airdrop_cap: env.parsed_or("AIRDROP_CAP", defaults.airdrop_cap)?,
            withdraw_minimum: env.parsed_or("WITHDRAW_MINIMUM", defaults.withdraw_minimum)?,
            ..defaults
        };

        let distribution = DistributionConfig {
            currency: Currency::Platform,
            decimals: platform_decimals,
            pool_amount: env.parsed_or("REWARD_POOL_AMOUNT", 5_000_000u64)?,
            top_n: env.parsed_or("REWARD_TOP_N", 10usize)?,
        };

        let mut price_pools = HashMap::new();
        for (currency, name) in [
            (Currency::Sol, "PRICE_POOL_URL_SOL"),
            (Currency::Platform, "PRICE_POOL_URL_PLATFORM"),
        ] {
            if let Some(raw) = env.optional(name) {
                Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    name,
                    reason: e.to_string(),
                })?;
                price_pools.insert(currency, raw);
            }
        }

        let log_format = match env.optional("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    reason: format!("expected `json` or `pretty`, got `{other}`"),
                })
            }
        };

        Ok(Self {
            host: env.optional("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env.parsed_or("PORT", DEFAULT_PORT)?,
            ledger_db_path: env
                .optional("LEDGER_DB_PATH")
                .unwrap_or_else(|| DEFAULT_LEDGER_DB_PATH.to_string())
                .into(),
            vault_master_key: env.required("VAULT_MASTER_KEY")?,
            solana_rpc_url,
            jwt_secret: env.required("JWT_SECRET")?,
            jwt_issuer: env.optional("JWT_ISSUER"),
            usdc_mint: env.pubkey_or("USDC_MINT", USDC_MAINNET_MINT)?,
            platform_mint: env.pubkey("PLATFORM_MINT")?,
            platform_decimals,
            treasury_keypair_path: env.required("TREASURY_KEYPAIR_PATH")?.into(),
            operator_keypair_path: env.required("OPERATOR_KEYPAIR_PATH")?.into(),
            operations_address: env.pubkey("OPERATIONS_ADDRESS")?,
            price_pools,
            settlement,
            distribution,
            distribution_interval: Duration::from_secs(
                env.parsed_or("DISTRIBUTION_INTERVAL_SECS", 3600u64)?,
            ),
            log_format,
        })
    }
}

struct Env<'a, F> {
    lookup: &'a F,
}

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &'static str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parsed_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }),
        }
    }

    fn pubkey(&self, name: &'static str) -> Result<Pubkey, ConfigError> {
        let raw = self.required(name)?;
        parse_pubkey(name, &raw)
    }

    fn pubkey_or(&self, name: &'static str, default: Pubkey) -> Result<Pubkey, ConfigError> {
        match self.optional(name) {
            None => Ok(default),
            Some(raw) => parse_pubkey(name, &raw),
        }
    }
}

fn parse_pubkey(name: &'static str, raw: &str) -> Result<Pubkey, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("`{raw}` is not a base58 address"),
    })
}

/// Read a keypair file in the Solana CLI format (JSON array of 64 bytes).
pub fn load_keypair(name: &'static str, path: &Path) -> Result<Keypair, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
        name,
        reason: format!("cannot read {}: {e}", path.display()),
    })?;
    let bytes: Vec<u8> = serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: format!("{} is not a JSON byte array: {e}", path.display()),
    })?;
    Keypair::try_from(bytes.as_slice()).map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("{} does not hold a 64-byte keypair", path.display()),
    })
}
