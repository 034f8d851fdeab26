// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Folio Settlement - Custodial Solana Settlement Service
//!
//! Holds per-user signing keys under encryption, settles paid chapter
//! unlocks, airdrop claims and withdrawals on Solana, and keeps the
//! off-chain reward ledger consistent with what landed on chain.
//!
//! ## Modules
//!
//! - `vault` - AES-256-GCM key vault and custodial key generation
//! - `storage` - redb ledger and per-entity repositories
//! - `chain` - Solana client, split-payment builder, submit/confirm loop
//! - `pricing` - USD list prices to token amounts
//! - `settlement` - unlock, airdrop and withdrawal orchestration
//! - `distribution` - ranked reward pool distribution
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer JWT authentication and roles

pub mod api;
pub mod auth;
pub mod chain;
pub mod config;
pub mod distribution;
pub mod error;
pub mod models;
pub mod pricing;
pub mod settlement;
pub mod state;
pub mod storage;
pub mod vault;
