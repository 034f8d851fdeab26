// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded retry for submission and polling for confirmation.
//!
//! Confirmation is bounded by the blockhash lifetime: once the chain's block
//! height passes the transaction's last valid height, it can no longer land.
//! The poll count is only a safety cap on top of that.

use std::time::Duration;

use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use super::client::{ChainClient, ChainError, SignatureState};

/// Exponential backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based), doubling up to the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Submit a signed transaction, retrying transient RPC failures.
///
/// Resubmitting the same signed transaction is safe: the chain deduplicates
/// by signature.
pub async fn submit_with_retry(
    client: &dyn ChainClient,
    transaction: &Transaction,
    policy: &RetryPolicy,
) -> Result<Signature, ChainError> {
    let mut attempt = 0;
    loop {
        match client.submit_transaction(transaction).await {
            Ok(signature) => return Ok(signature),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                tracing::warn!(attempt, error = %err, "Transaction submission failed, retrying");
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Poll until `signature` is confirmed, fails, or its blockhash expires.
///
/// `Timeout` means the safety cap ran out while the blockhash was still
/// valid, so the transaction may yet land.
pub async fn confirm_transaction(
    client: &dyn ChainClient,
    signature: &Signature,
    last_valid_block_height: u64,
    policy: &RetryPolicy,
) -> Result<(), ChainError> {
    for attempt in 0..policy.max_attempts {
        match client.signature_status(signature).await {
            Ok(SignatureState::Confirmed) => return Ok(()),
            Ok(SignatureState::Failed(reason)) => {
                return Err(ChainError::TransactionFailed(reason));
            }
            Ok(SignatureState::Pending) => {}
            Err(err) if err.is_transient() => {
                tracing::debug!(%signature, error = %err, "Status check failed");
            }
            Err(err) => return Err(err),
        }

        if let Ok(height) = client.block_height().await {
            if height > last_valid_block_height {
                // It may have landed in the last valid block
                return match client.signature_status(signature).await {
                    Ok(SignatureState::Confirmed) => Ok(()),
                    Ok(SignatureState::Failed(reason)) => {
                        Err(ChainError::TransactionFailed(reason))
                    }
                    Ok(SignatureState::Pending) => Err(ChainError::Expired),
                    Err(err) => Err(err),
                };
            }
        }

        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }

    Err(ChainError::Timeout(policy.max_attempts))
}
