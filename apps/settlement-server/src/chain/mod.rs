// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Solana integration.
//!
//! This module provides functionality for:
//! - Querying native and SPL token balances
//! - Building split payments (transfers, account creation, burns)
//! - Submitting and confirming transactions with bounded retries

pub mod builder;
pub mod client;
pub mod confirm;
pub mod instructions;
#[cfg(test)]
pub mod mock;
pub mod types;

pub use builder::{
    split_amount, Beneficiary, BuildError, Destination, PaymentLeg, PaymentTransactionBuilder,
    UnsignedTransaction,
};
pub use client::{ChainClient, ChainError, SignatureState, SolanaRpcClient};
pub use confirm::{confirm_transaction, submit_with_retry, RetryPolicy};
pub use types::*;
