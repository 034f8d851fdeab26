// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared domain enums used by the ledger, the chain layer and the API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Chain tag stored on every off-chain balance row.
pub const CHAIN_TAG: &str = "solana";

/// Chapter reference used by unlocks that cover a whole content item.
pub const WHOLE_CONTENT: &str = "*";

/// Currencies the platform settles in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Currency {
    /// Native SOL (lamports)
    #[serde(rename = "SOL")]
    Sol,
    /// USD-pegged SPL token
    #[serde(rename = "USDC")]
    Usdc,
    /// Platform reward token (SPL, burnable)
    #[serde(rename = "PLATFORM")]
    Platform,
}

impl Currency {
    /// Ticker used as the ledger's currency tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Currency::Sol => "SOL",
            Currency::Usdc => "USDC",
            Currency::Platform => "PLATFORM",
        }
    }

    /// Whether this is the chain's native currency.
    pub fn is_native(&self) -> bool {
        matches!(self, Currency::Sol)
    }

    /// Whether payments in this currency may carry a burn leg.
    pub fn is_burnable(&self) -> bool {
        matches!(self, Currency::Platform)
    }

    /// Whether this currency is pegged 1:1 to USD.
    pub fn is_usd_pegged(&self) -> bool {
        matches!(self, Currency::Usdc)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SOL" => Ok(Currency::Sol),
            "USDC" => Ok(Currency::Usdc),
            "PLATFORM" => Ok(Currency::Platform),
            other => Err(format!("unsupported currency `{other}`")),
        }
    }
}

/// How a content purchase is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    /// One chapter, permanent access
    Single,
    /// Whole content item for a limited period
    Bundle,
    /// Whole content item, subscription-like period
    Subscription,
}

impl PaymentType {
    /// Bundle and subscription unlocks cover the whole content item and expire.
    pub fn is_time_limited(&self) -> bool {
        !matches!(self, PaymentType::Single)
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentType::Single => f.write_str("single"),
            PaymentType::Bundle => f.write_str("bundle"),
            PaymentType::Subscription => f.write_str("subscription"),
        }
    }
}

/// Lock policy of a chapter, set by the content's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Free to read; every paid type is rejected
    Free,
    /// Sold per chapter; every paid type is accepted
    PerChapter,
    /// Only reachable through bundle or subscription
    Locked,
}

impl LockPolicy {
    /// Whether a request with `payment_type` is valid for this chapter.
    pub fn accepts(&self, payment_type: PaymentType) -> bool {
        match self {
            LockPolicy::Free => false,
            LockPolicy::PerChapter => true,
            LockPolicy::Locked => payment_type != PaymentType::Single,
        }
    }
}
