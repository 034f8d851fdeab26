// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Settlement Orchestrator
//!
//! Drives the three money-moving flows end to end:
//!
//! ```text
//! unlock    Validate → CheckEligibility → Build → Sign&Submit → Confirm → Record
//! airdrop   Reserve  → Checks           → Build → Sign&Submit → Confirm → Flag, Credit
//! withdraw  Checks   →                    Build → Sign&Submit → Confirm → Debit + Event
//! ```
//!
//! ## Invariants
//!
//! - Nothing is written to the ledger before the chain confirms
//! - Preconditions are re-checked right before submission
//! - A confirmed transaction whose ledger write fails is parked as a
//!   discrepancy and reported as `RecordingFailed`, never as a failed payment
//! - A submitted transaction whose outcome is unknown is parked the same way
//!   and reported as `ConfirmationUnknown`; no new transaction of that kind
//!   is built for the user until the entry is reconciled
//! - One in-flight request per (user, action)

pub mod airdrop;
pub mod reconcile;
pub mod unlock;
pub mod withdraw;

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;

use crate::chain::{
    associated_token_address, confirm_transaction, submit_with_retry, BuildError, ChainClient,
    ChainError, CurrencySpec, PaymentTransactionBuilder, RetryPolicy, TokenRegistry,
    UnsignedTransaction,
};
use crate::models::PaymentType;
use crate::pricing::{PriceError, PriceSource};
use crate::storage::{
    AccountRepository, CustodialAccount, Discrepancy, DiscrepancyCause, DiscrepancyRepository,
    LedgerDb, LedgerError, PendingRecord,
};
use crate::vault::{generate_custodial_keypair, KeyVault, VaultError};

pub use airdrop::AirdropOutcome;
pub use unlock::{PendingSignature, SignedUnlockRequest, UnlockOutcome, UnlockRequest};
pub use withdraw::{WithdrawalOutcome, WithdrawalRequest};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("payment type `{payment_type}` is not accepted for this chapter")]
    PaymentTypeMismatch { payment_type: PaymentType },

    #[error("airdrop already claimed")]
    AlreadyClaimed,

    #[error("airdrop claim limit reached")]
    ClaimCapReached,

    #[error("airdrop pool is temporarily unable to pay network fees")]
    OperatorReserveLow,

    #[error("token account already exists for this user")]
    TokenAccountExists,

    #[error("insufficient on-chain balance: need {required}, have {available}")]
    InsufficientOnChainBalance { required: u64, available: u64 },

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientOffChainBalance { requested: u64, available: u64 },

    #[error("amount is below the minimum of {minimum}")]
    BelowMinimum { minimum: u64 },

    #[error("a request of this kind is already in progress")]
    RequestInFlight,

    #[error("treasury cannot cover this withdrawal right now, try later")]
    TreasuryInsufficient,

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("price unavailable: {0}")]
    Price(#[from] PriceError),

    #[error("transaction {signature} confirmed but recording failed")]
    RecordingFailed { signature: String },

    #[error("transaction {signature} was submitted but its outcome is not known yet")]
    ConfirmationUnknown { signature: String },

    #[error("an earlier transaction {signature} is still being reconciled")]
    SettlementPending { signature: String },

    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("storage error: {0}")]
    Storage(#[from] LedgerError),
}

impl From<BuildError> for SettlementError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Chain(chain) => SettlementError::Chain(chain),
            other => SettlementError::Validation(other.to_string()),
        }
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;

// =============================================================================
// Configuration
// =============================================================================

/// Fixed USD list prices per payment type, in micro-USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockPrices {
    pub single: u64,
    pub bundle: u64,
    pub subscription: u64,
}

impl UnlockPrices {
    pub fn for_type(&self, payment_type: PaymentType) -> u64 {
        match payment_type {
            PaymentType::Single => self.single,
            PaymentType::Bundle => self.bundle,
            PaymentType::Subscription => self.subscription,
        }
    }
}

/// Settlement limits and knobs.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub prices: UnlockPrices,
    /// Lamports a payer must keep for fees
    pub fee_reserve_lamports: u64,
    /// Lamports the airdrop operator must hold before paying out
    pub operator_reserve_lamports: u64,
    /// Platform token minor units per claim
    pub airdrop_amount: u64,
    pub airdrop_cap: u64,
    pub claim_reservation_ttl: Duration,
    /// Minimum withdrawal in minor units
    pub withdraw_minimum: u64,
    /// Validity of bundle and subscription unlocks
    pub unlock_period: Duration,
    pub submit_retry: RetryPolicy,
    pub confirm_poll: RetryPolicy,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            prices: UnlockPrices {
                single: 300_000,
                bundle: 4_990_000,
                subscription: 9_990_000,
            },
            fee_reserve_lamports: 5_000_000,
            operator_reserve_lamports: 50_000_000,
            airdrop_amount: 100_000_000,
            airdrop_cap: 10_000,
            claim_reservation_ttl: Duration::minutes(10),
            withdraw_minimum: 10_000_000,
            unlock_period: Duration::days(30),
            submit_retry: RetryPolicy::default(),
            // Blockhash expiry ends polling first; this cap is a backstop
            confirm_poll: RetryPolicy {
                max_attempts: 240,
                base_delay: std::time::Duration::from_millis(500),
                max_delay: std::time::Duration::from_secs(2),
            },
        }
    }
}

/// Server-held wallets.
pub struct PlatformWallets {
    /// Receives the treasury share and funds withdrawals
    pub treasury: Keypair,
    /// Funds airdrops
    pub operator: Keypair,
    /// Receives the operations share
    pub operations: Pubkey,
}

// =============================================================================
// Single-flight guard
// =============================================================================

/// Tracks in-flight (user, action) pairs.
#[derive(Debug, Default)]
pub struct InFlight {
    active: Mutex<HashSet<(String, &'static str)>>,
}

impl InFlight {
    /// Claim the (user, action) slot, or `None` if it is taken.
    pub fn try_acquire(&self, user_id: &str, action: &'static str) -> Option<InFlightGuard<'_>> {
        let key = (user_id.to_string(), action);
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard { owner: self, key })
    }
}

/// Releases its slot on drop.
pub struct InFlightGuard<'a> {
    owner: &'a InFlight,
    key: (String, &'static str),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.owner.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.key);
    }
}

// =============================================================================
// Service
// =============================================================================

/// Custodial settlement service shared by all request handlers.
pub struct SettlementService {
    ledger: Arc<LedgerDb>,
    vault: Arc<KeyVault>,
    chain: Arc<dyn ChainClient>,
    builder: PaymentTransactionBuilder,
    prices: Arc<dyn PriceSource>,
    tokens: TokenRegistry,
    wallets: PlatformWallets,
    config: SettlementConfig,
    in_flight: InFlight,
    quotes: unlock::ExternalQuotes,
}

impl SettlementService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<LedgerDb>,
        vault: Arc<KeyVault>,
        chain: Arc<dyn ChainClient>,
        prices: Arc<dyn PriceSource>,
        tokens: TokenRegistry,
        wallets: PlatformWallets,
        config: SettlementConfig,
    ) -> Self {
        Self {
            builder: PaymentTransactionBuilder::new(chain.clone()),
            ledger,
            vault,
            chain,
            prices,
            tokens,
            wallets,
            config,
            in_flight: InFlight::default(),
            quotes: unlock::ExternalQuotes::default(),
        }
    }

    pub fn ledger(&self) -> &LedgerDb {
        &self.ledger
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn chain(&self) -> &dyn ChainClient {
        self.chain.as_ref()
    }

    pub fn vault(&self) -> &KeyVault {
        &self.vault
    }

    /// The user's custodial account, generated on first use.
    pub fn custodial_account(&self, user_id: &str) -> SettlementResult<CustodialAccount> {
        let accounts = AccountRepository::new(&self.ledger);
        if let Some(account) = accounts.get(user_id)? {
            return Ok(account);
        }

        let generated = generate_custodial_keypair(&self.vault)?;
        let (account, created) = accounts.insert_if_absent(&CustodialAccount {
            user_id: user_id.to_string(),
            chain_address: generated.chain_address,
            encrypted_secret: generated.encrypted_secret,
            created_at: Utc::now(),
        })?;

        if created {
            tracing::info!(
                user_id = %user_id,
                chain_address = %account.chain_address,
                "Custodial account created"
            );
        }
        Ok(account)
    }

    fn begin(&self, user_id: &str, action: &'static str) -> SettlementResult<InFlightGuard<'_>> {
        self.in_flight
            .try_acquire(user_id, action)
            .ok_or(SettlementError::RequestInFlight)
    }

    /// Sign, submit and wait for confirmation.
    async fn sign_and_send(
        &self,
        mut unsigned: UnsignedTransaction,
        signer: &Keypair,
        pending: impl FnOnce(&str) -> PendingRecord,
    ) -> SettlementResult<String> {
        let signature = unsigned.sign(signer)?;
        self.send_signed(
            &unsigned.transaction,
            signature,
            unsigned.last_valid_block_height,
            pending,
        )
        .await
    }

    /// Submit a signed transaction and wait for confirmation.
    ///
    /// A rejection or an expired blockhash means the transaction cannot
    /// land. Any other failure after signing leaves the outcome unknown:
    /// `pending` is parked under the signature and `ConfirmationUnknown` is
    /// returned.
    async fn send_signed(
        &self,
        transaction: &Transaction,
        signature: Signature,
        last_valid_block_height: u64,
        pending: impl FnOnce(&str) -> PendingRecord,
    ) -> SettlementResult<String> {
        let chain = self.chain.as_ref();
        let outcome = match submit_with_retry(chain, transaction, &self.config.submit_retry).await {
            Ok(_) => {
                tracing::info!(%signature, "Transaction submitted");
                confirm_transaction(
                    chain,
                    &signature,
                    last_valid_block_height,
                    &self.config.confirm_poll,
                )
                .await
            }
            Err(err) if err.is_transient() => Err(err),
            Err(err) => return Err(err.into()),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(%signature, "Transaction confirmed");
                Ok(signature.to_string())
            }
            Err(err @ (ChainError::TransactionFailed(_) | ChainError::Expired)) => Err(err.into()),
            Err(err) => {
                let signature = signature.to_string();
                self.park(
                    &signature,
                    pending(&signature),
                    DiscrepancyCause::Unconfirmed {
                        last_valid_block_height,
                    },
                    &err,
                );
                Err(SettlementError::ConfirmationUnknown { signature })
            }
        }
    }

    /// Park a post-confirmation recording failure for replay.
    fn park_discrepancy(&self, signature: &str, pending: PendingRecord, reason: &LedgerError) {
        self.park(signature, pending, DiscrepancyCause::RecordingFailed, reason);
    }

    fn park(
        &self,
        signature: &str,
        pending: PendingRecord,
        cause: DiscrepancyCause,
        reason: &dyn Display,
    ) {
        match cause {
            DiscrepancyCause::RecordingFailed => tracing::error!(
                signature = %signature,
                kind = pending.kind(),
                error = %reason,
                "Ledger write failed after confirmation"
            ),
            DiscrepancyCause::Unconfirmed { .. } => tracing::warn!(
                signature = %signature,
                kind = pending.kind(),
                error = %reason,
                "Transaction outcome unknown; parked for reconciliation"
            ),
        }

        let discrepancy = Discrepancy {
            signature: signature.to_string(),
            pending,
            cause,
            reason: reason.to_string(),
            detected_at: Utc::now(),
            resolved_at: None,
            resolution: None,
        };
        if let Err(err) = DiscrepancyRepository::new(&self.ledger).record(&discrepancy) {
            tracing::error!(
                signature = %signature,
                error = %err,
                "Failed to store discrepancy; manual reconciliation required"
            );
        }
    }

    fn treasury_address(&self) -> Pubkey {
        self.wallets.treasury.pubkey()
    }

    /// Live balance of `owner` in `spec`: lamports, or the associated token
    /// account's amount.
    async fn live_balance(&self, owner: &Pubkey, spec: &CurrencySpec) -> SettlementResult<u64> {
        let amount = match spec.mint {
            None => self.chain.native_balance(owner).await?,
            Some(mint) => {
                self.chain
                    .token_account_balance(&associated_token_address(owner, &mint))
                    .await?
            }
        };
        Ok(amount)
    }
}

// =============================================================================
// Test support
// =============================================================================
