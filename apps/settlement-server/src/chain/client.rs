// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Solana RPC client behind the `ChainClient` seam.
//!
//! Settlement code talks to the chain only through [`ChainClient`], so the
//! orchestrator can be exercised against an in-memory chain in tests.

use async_trait::async_trait;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use super::types::{token_account_amount, TOKEN_PROGRAM_ID};

/// Errors from chain access.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid account data: {0}")]
    InvalidAccountData(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Blockhash expired before the transaction was confirmed")]
    Expired,

    #[error("Transaction not confirmed after {0} status checks")]
    Timeout(u32),

    #[error("Signing failed: {0}")]
    Signing(String),
}

impl ChainError {
    /// Whether retrying the same operation later may succeed.
    ///
    /// `Timeout` is excluded: the transaction may still land, so building a
    /// new one is not safe.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Rpc(_) | ChainError::Expired)
    }
}

impl From<ClientError> for ChainError {
    fn from(err: ClientError) -> Self {
        match err.get_transaction_error() {
            Some(tx_err) => ChainError::TransactionFailed(tx_err.to_string()),
            None => ChainError::Rpc(err.to_string()),
        }
    }
}

/// Observed state of a submitted signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    /// Not yet seen at the client's commitment level
    Pending,
    Confirmed,
    /// Landed but failed on-chain
    Failed(String),
}

/// Chain operations needed by settlement.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest blockhash and the last block height at which it is valid.
    async fn latest_blockhash(&self) -> Result<(Hash, u64), ChainError>;

    async fn submit_transaction(&self, transaction: &Transaction)
        -> Result<Signature, ChainError>;

    async fn signature_status(&self, signature: &Signature)
        -> Result<SignatureState, ChainError>;

    async fn block_height(&self) -> Result<u64, ChainError>;

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ChainError>;

    /// Lamports held by `address` (0 if the account does not exist).
    async fn native_balance(&self, address: &Pubkey) -> Result<u64, ChainError>;

    /// Token amount held by a token account (0 if it does not exist).
    async fn token_account_balance(&self, token_account: &Pubkey) -> Result<u64, ChainError>;
}

/// `ChainClient` over the Solana JSON-RPC API.
pub struct SolanaRpcClient {
    rpc: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpcClient {
    /// Create a client at `confirmed` commitment.
    pub fn new(rpc_url: &str) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            rpc: RpcClient::new_with_commitment(rpc_url.to_string(), commitment),
            commitment,
        }
    }
}

#[async_trait]
impl ChainClient for SolanaRpcClient {
    async fn latest_blockhash(&self) -> Result<(Hash, u64), ChainError> {
        Ok(self
            .rpc
            .get_latest_blockhash_with_commitment(self.commitment)
            .await?)
    }

    async fn submit_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Signature, ChainError> {
        Ok(self.rpc.send_transaction(transaction).await?)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureState, ChainError> {
        let status = self
            .rpc
            .get_signature_status_with_commitment(signature, self.commitment)
            .await?;

        Ok(match status {
            None => SignatureState::Pending,
            Some(Ok(())) => SignatureState::Confirmed,
            Some(Err(err)) => SignatureState::Failed(err.to_string()),
        })
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        Ok(self
            .rpc
            .get_block_height_with_commitment(self.commitment)
            .await?)
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ChainError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.commitment)
            .await?;
        Ok(response.value.is_some())
    }

    async fn native_balance(&self, address: &Pubkey) -> Result<u64, ChainError> {
        let response = self
            .rpc
            .get_balance_with_commitment(address, self.commitment)
            .await?;
        Ok(response.value)
    }

    async fn token_account_balance(&self, token_account: &Pubkey) -> Result<u64, ChainError> {
        let response = self
            .rpc
            .get_account_with_commitment(token_account, self.commitment)
            .await?;

        match response.value {
            None => Ok(0),
            Some(account) if account.owner == TOKEN_PROGRAM_ID => {
                token_account_amount(&account.data)
            }
            Some(account) => Err(ChainError::InvalidAccountData(format!(
                "{token_account} is owned by {}, not the token program",
                account.owner
            ))),
        }
    }
}
