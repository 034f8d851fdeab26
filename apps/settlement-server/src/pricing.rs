// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Price quotes for converting USD list prices into chain amounts.
//!
//! USD prices are held in micro-USD (1 USD = 1_000_000). A USD-pegged
//! token converts at a fixed 1:1 rate; everything else is priced from a
//! liquidity pool's reserves fetched over HTTP. Pool data is untrusted and
//! is rejected unless it yields a finite, positive unit price.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::chain::CurrencySpec;
use crate::models::Currency;

/// Micro-USD per USD.
pub const MICRO_USD_PER_USD: u64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("no price source configured for {0}")]
    NotConfigured(Currency),

    #[error("price request failed: {0}")]
    Request(String),

    #[error("price response was invalid: {0}")]
    InvalidResponse(String),

    #[error("price quote rejected: {0}")]
    InvalidQuote(String),
}

/// Reserves of a base/quote pool. The quote side is USD-denominated.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PoolReserves {
    pub base_amount: f64,
    pub quote_amount: f64,
}

impl PoolReserves {
    /// USD per whole base token.
    pub fn unit_price(&self) -> Result<f64, PriceError> {
        if !self.base_amount.is_finite() || self.base_amount <= 0.0 {
            return Err(PriceError::InvalidQuote(format!(
                "base amount {} is not positive",
                self.base_amount
            )));
        }
        let price = self.quote_amount / self.base_amount;
        if !price.is_finite() || price <= 0.0 {
            return Err(PriceError::InvalidQuote(format!(
                "unit price {price} is not positive"
            )));
        }
        Ok(price)
    }
}

/// Source of live pool reserves.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn pool_reserves(&self, currency: Currency) -> Result<PoolReserves, PriceError>;
}

/// Fetches pool reserves as JSON `{"base_amount": .., "quote_amount": ..}`.
#[derive(Debug, Clone)]
pub struct HttpPoolPriceSource {
    http: Client,
    pool_urls: HashMap<Currency, String>,
}

impl HttpPoolPriceSource {
    pub fn new(pool_urls: HashMap<Currency, String>) -> Result<Self, PriceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PriceError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, pool_urls })
    }
}

#[async_trait]
impl PriceSource for HttpPoolPriceSource {
    async fn pool_reserves(&self, currency: Currency) -> Result<PoolReserves, PriceError> {
        let url = self
            .pool_urls
            .get(&currency)
            .ok_or(PriceError::NotConfigured(currency))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PriceError::Request(format!("GET {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PriceError::Request(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PriceError::InvalidResponse(format!("GET {url} invalid JSON: {e}")))
    }
}

/// Convert a micro-USD price into minor units of `spec`, rounding up.
pub async fn quote_amount(
    source: &dyn PriceSource,
    spec: &CurrencySpec,
    usd_micros: u64,
) -> Result<u64, PriceError> {
    if spec.currency.is_usd_pegged() {
        return pegged_amount(usd_micros, spec.decimals);
    }

    let price = source.pool_reserves(spec.currency).await?.unit_price()?;
    let whole_tokens = usd_micros as f64 / MICRO_USD_PER_USD as f64 / price;
    let minor = (whole_tokens * 10f64.powi(spec.decimals as i32)).ceil();

    if !minor.is_finite() || minor < 1.0 || minor >= u64::MAX as f64 {
        return Err(PriceError::InvalidQuote(format!(
            "{usd_micros} micro-USD converts to {minor} {} units",
            spec.currency
        )));
    }
    Ok(minor as u64)
}

fn pegged_amount(usd_micros: u64, decimals: u8) -> Result<u64, PriceError> {
    let scale = 10u128.pow(decimals as u32);
    let divisor = MICRO_USD_PER_USD as u128;
    let minor = (usd_micros as u128 * scale).div_ceil(divisor);
    u64::try_from(minor).map_err(|_| PriceError::InvalidQuote("amount overflows u64".to_string()))
}

/// Price source with fixed reserves.
#[cfg(test)]
pub struct FixedPriceSource(pub HashMap<Currency, PoolReserves>);

#[cfg(test)]
impl FixedPriceSource {
    /// One pool per currency, priced at `usd_per_token`.
    pub fn with_prices(prices: &[(Currency, f64)]) -> Self {
        Self(
            prices
                .iter()
                .map(|&(currency, price)| {
                    (
                        currency,
                        PoolReserves {
                            base_amount: 1_000.0,
                            quote_amount: 1_000.0 * price,
                        },
                    )
                })
                .collect(),
        )
    }
}

#[cfg(test)]
#[async_trait]
impl PriceSource for FixedPriceSource {
    async fn pool_reserves(&self, currency: Currency) -> Result<PoolReserves, PriceError> {
        self.0
            .get(&currency)
            .copied()
            .ok_or(PriceError::NotConfigured(currency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    fn spec(currency: Currency, decimals: u8) -> CurrencySpec {
        CurrencySpec {
            currency,
            mint: (currency != Currency::Sol).then(Pubkey::new_unique),
            decimals,
        }
    }

    #[test]
    fn unit_price_requires_positive_finite_values() {
        let ok = PoolReserves { base_amount: 2.0, quote_amount: 300.0 };
        assert_eq!(ok.unit_price().unwrap(), 150.0);

        for bad in [
            PoolReserves { base_amount: 0.0, quote_amount: 1.0 },
            PoolReserves { base_amount: 1.0, quote_amount: 0.0 },
            PoolReserves { base_amount: 1.0, quote_amount: -5.0 },
            PoolReserves { base_amount: f64::NAN, quote_amount: 1.0 },
            PoolReserves { base_amount: 1.0, quote_amount: f64::INFINITY },
        ] {
            assert!(bad.unit_price().is_err(), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn pegged_currency_skips_price_source() {
        let source = FixedPriceSource(HashMap::new());
        let amount = quote_amount(&source, &spec(Currency::Usdc, 6), 1_990_000)
            .await
            .unwrap();
        assert_eq!(amount, 1_990_000);
    }

    #[tokio::test]
    async fn live_quote_rounds_up() {
        let source = FixedPriceSource::with_prices(&[(Currency::Sol, 150.0)]);
        // $1.00 at $150/SOL = 0.00666.. SOL = 6_666_666.67 lamports
        let amount = quote_amount(&source, &spec(Currency::Sol, 9), 1_000_000)
            .await
            .unwrap();
        assert_eq!(amount, 6_666_667);
    }

    #[tokio::test]
    async fn missing_pool_is_error() {
        let source = FixedPriceSource(HashMap::new());
        assert!(matches!(
            quote_amount(&source, &spec(Currency::Platform, 6), 1_000_000).await,
            Err(PriceError::NotConfigured(Currency::Platform))
        ));
    }

    #[test]
    fn pegged_amount_scales_decimals() {
        assert_eq!(pegged_amount(1, 6).unwrap(), 1);
        assert_eq!(pegged_amount(1, 2).unwrap(), 1);
        assert_eq!(pegged_amount(2_500_000, 9).unwrap(), 2_500_000_000);
    }
}
