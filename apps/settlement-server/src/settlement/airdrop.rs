// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-time platform token airdrop.
//!
//! The claim flag is authoritative: once the transfer confirms, the flag is
//! set first and the off-chain credit follows as a separate write. A failed
//! credit is parked for reconciliation but the claim still succeeds.

use chrono::Utc;
use serde::Serialize;
use solana_sdk::signature::Signer;
use utoipa::ToSchema;

use super::{SettlementError, SettlementResult, SettlementService};
use crate::chain::{
    associated_token_address, parse_address, Beneficiary, ChainError, UnsignedTransaction,
};
use crate::models::Currency;
use crate::storage::{
    BalanceRepository, ClaimRepository, LedgerEvent, LedgerEventKind, PendingRecord,
    ReserveOutcome,
};

const ACTION: &str = "airdrop";

/// Parked record kind that gates a new claim.
const ACTION_KIND: &str = "airdrop_claim";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AirdropOutcome {
    pub signature: String,
    /// Platform token minor units
    pub amount: u64,
    pub decimals: u8,
    /// `false` when the off-chain credit is pending reconciliation
    pub balance_recorded: bool,
}

/// Event id of the off-chain credit for an airdrop transfer.
pub(crate) fn airdrop_event_id(signature: &str) -> String {
    format!("airdrop:{signature}")
}

impl SettlementService {
    pub async fn claim_airdrop(&self, user_id: &str) -> SettlementResult<AirdropOutcome> {
        let _guard = self.begin(user_id, ACTION)?;

        let operator = self.wallets.operator.pubkey();
        let lamports = self.chain.native_balance(&operator).await?;
        if lamports < self.config.operator_reserve_lamports {
            tracing::warn!(
                operator = %operator,
                lamports,
                reserve = self.config.operator_reserve_lamports,
                "Airdrop operator below fee reserve"
            );
            return Err(SettlementError::OperatorReserveLow);
        }

        self.settle_open(user_id, ACTION_KIND).await?;

        let claims = ClaimRepository::new(&self.ledger);
        match claims.reserve(
            user_id,
            self.config.airdrop_cap,
            Utc::now(),
            self.config.claim_reservation_ttl,
        )? {
            ReserveOutcome::Reserved => {}
            ReserveOutcome::CapReached => return Err(SettlementError::ClaimCapReached),
            ReserveOutcome::AlreadyClaimed => return Err(SettlementError::AlreadyClaimed),
            ReserveOutcome::InProgress => return Err(SettlementError::RequestInFlight),
        }

        let unsigned = match self.prepare_airdrop(user_id).await {
            Ok(unsigned) => unsigned,
            Err(err) => {
                self.release_reservation(user_id);
                return Err(err);
            }
        };

        let spec = self.tokens.spec(Currency::Platform);
        let amount = self.config.airdrop_amount;
        let pending = |_: &str| PendingRecord::AirdropClaim {
            user_id: user_id.to_string(),
            currency: spec.currency,
            decimals: spec.decimals,
            amount,
        };

        let signature = match self
            .sign_and_send(unsigned, &self.wallets.operator, pending)
            .await
        {
            Ok(signature) => signature,
            Err(err) => {
                // Only a transfer that can no longer land frees the slot
                if matches!(
                    err,
                    SettlementError::Chain(ChainError::TransactionFailed(_) | ChainError::Expired)
                ) {
                    self.release_reservation(user_id);
                }
                return Err(err);
            }
        };

        let now = Utc::now();

        if let Err(err) = claims.mark_claimed(user_id, &signature, now) {
            self.park_discrepancy(
                &signature,
                PendingRecord::AirdropClaim {
                    user_id: user_id.to_string(),
                    currency: spec.currency,
                    decimals: spec.decimals,
                    amount,
                },
                &err,
            );
            return Err(SettlementError::RecordingFailed { signature });
        }

        let event = LedgerEvent {
            event_id: airdrop_event_id(&signature),
            owner_id: user_id.to_string(),
            kind: LedgerEventKind::AirdropCredit,
            currency: spec.currency,
            amount,
            signature: Some(signature.clone()),
            created_at: now,
        };
        let balance_recorded =
            match BalanceRepository::new(&self.ledger).credit_with_event(&event, spec.decimals) {
                Ok(_) => true,
                Err(err) => {
                    self.park_discrepancy(
                        &signature,
                        PendingRecord::AirdropCredit {
                            user_id: user_id.to_string(),
                            currency: spec.currency,
                            decimals: spec.decimals,
                            amount,
                        },
                        &err,
                    );
                    false
                }
            };

        tracing::info!(
            user_id = %user_id,
            signature = %signature,
            amount,
            balance_recorded,
            "Airdrop claimed"
        );
        Ok(AirdropOutcome {
            signature,
            amount,
            decimals: spec.decimals,
            balance_recorded,
        })
    }

    /// Build the operator → user transfer. Fails if the user already holds
    /// a platform token account.
    async fn prepare_airdrop(&self, user_id: &str) -> SettlementResult<UnsignedTransaction> {
        let spec = self.tokens.spec(Currency::Platform);
        let account = self.custodial_account(user_id)?;
        let owner = parse_address(&account.chain_address)?;

        if let Some(mint) = spec.mint {
            let token_account = associated_token_address(&owner, &mint);
            if self.chain.account_exists(&token_account).await? {
                return Err(SettlementError::TokenAccountExists);
            }
        }

        Ok(self
            .builder
            .build(
                &self.wallets.operator.pubkey(),
                &[Beneficiary::account(owner, 1)],
                self.config.airdrop_amount,
                &spec,
            )
            .await?)
    }

    pub(super) fn release_reservation(&self, user_id: &str) {
        if let Err(err) = ClaimRepository::new(&self.ledger).release(user_id) {
            tracing::warn!(user_id = %user_id, error = %err, "Failed to release claim reservation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::test_support::Harness;
    use crate::chain::RetryPolicy;
    use crate::settlement::SettlementConfig;
    use crate::storage::{DiscrepancyRepository, EventRepository, ReserveOutcome};
    use chrono::Duration;

    const SOL: u64 = 1_000_000_000;

    fn funded() -> Harness {
        let h = Harness::new();
        h.chain.set_native(h.operator(), SOL);
        h
    }

    #[tokio::test]
    async fn claim_transfers_flags_and_credits() {
        let h = funded();
        let outcome = h.service.claim_airdrop("alice").await.unwrap();
        assert!(outcome.balance_recorded);
        assert_eq!(outcome.amount, h.service.config().airdrop_amount);

        let ledger = h.service.ledger();
        let claims = ClaimRepository::new(ledger);
        assert!(claims.has_claimed("alice").unwrap());
        assert_eq!(claims.claim_count().unwrap(), 1);
        assert_eq!(
            BalanceRepository::new(ledger)
                .amount("alice", Currency::Platform)
                .unwrap(),
            outcome.amount
        );
        let event = EventRepository::new(ledger)
            .get(&airdrop_event_id(&outcome.signature))
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, LedgerEventKind::AirdropCredit);
    }

    #[tokio::test]
    async fn second_claim_is_rejected() {
        let h = funded();
        h.service.claim_airdrop("alice").await.unwrap();
        assert!(matches!(
            h.service.claim_airdrop("alice").await,
            Err(SettlementError::AlreadyClaimed)
        ));
        assert_eq!(h.chain.submitted().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_claims_credit_once() {
        let h = funded();
        let (first, second) = tokio::join!(
            h.service.claim_airdrop("alice"),
            h.service.claim_airdrop("alice")
        );
        assert_eq!([&first, &second].iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            BalanceRepository::new(h.service.ledger())
                .amount("alice", Currency::Platform)
                .unwrap(),
            h.service.config().airdrop_amount
        );
    }

    #[tokio::test]
    async fn low_operator_reserve_wins_over_other_checks() {
        let h = Harness::new();
        h.chain.set_native(h.operator(), 1_000);
        assert!(matches!(
            h.service.claim_airdrop("alice").await,
            Err(SettlementError::OperatorReserveLow)
        ));
        assert_eq!(
            ClaimRepository::new(h.service.ledger())
                .reserve("alice", 10, Utc::now(), Duration::minutes(10))
                .unwrap(),
            ReserveOutcome::Reserved
        );
    }

    #[tokio::test]
    async fn cap_stops_further_claims() {
        let h = Harness::with_config(SettlementConfig {
            airdrop_cap: 1,
            submit_retry: RetryPolicy::immediate(2),
            confirm_poll: RetryPolicy::immediate(2),
            ..SettlementConfig::default()
        });
        h.chain.set_native(h.operator(), SOL);

        h.service.claim_airdrop("alice").await.unwrap();
        assert!(matches!(
            h.service.claim_airdrop("bob").await,
            Err(SettlementError::ClaimCapReached)
        ));
    }

    #[tokio::test]
    async fn existing_token_account_releases_reservation() {
        let h = funded();
        h.fund_user("bob", 0, Currency::Platform, 0);

        assert!(matches!(
            h.service.claim_airdrop("bob").await,
            Err(SettlementError::TokenAccountExists)
        ));
        let claims = ClaimRepository::new(h.service.ledger());
        assert!(!claims.has_claimed("bob").unwrap());
        assert_eq!(
            claims.reserve("bob", 10, Utc::now(), Duration::minutes(10)).unwrap(),
            ReserveOutcome::Reserved
        );
    }

    #[tokio::test]
    async fn failed_transfer_leaves_user_unclaimed() {
        let h = funded();
        h.chain.set_onchain_failure("insufficient funds");

        assert!(h.service.claim_airdrop("alice").await.is_err());
        let ledger = h.service.ledger();
        assert!(!ClaimRepository::new(ledger).has_claimed("alice").unwrap());
        assert_eq!(
            BalanceRepository::new(ledger)
                .amount("alice", Currency::Platform)
                .unwrap(),
            0
        );
        assert_eq!(
            ClaimRepository::new(ledger)
                .reserve("alice", 10, Utc::now(), Duration::minutes(10))
                .unwrap(),
            ReserveOutcome::Reserved
        );
    }

    #[tokio::test]
    async fn credit_failure_keeps_the_claim_and_parks_the_credit() {
        let h = funded();
        let ledger = h.ledger_handle();
        // The claim flag write goes through; the balance credit fails
        h.chain.on_next_confirmation(move || ledger.fail_write_after(1));

        let outcome = h.service.claim_airdrop("alice").await.unwrap();
        assert!(!outcome.balance_recorded);

        let ledger = h.service.ledger();
        assert!(ClaimRepository::new(ledger).has_claimed("alice").unwrap());
        assert_eq!(
            BalanceRepository::new(ledger)
                .amount("alice", Currency::Platform)
                .unwrap(),
            0
        );
        let parked = DiscrepancyRepository::new(ledger)
            .get(&outcome.signature)
            .unwrap()
            .unwrap();
        assert_eq!(parked.pending.kind(), "airdrop_credit");

        h.service.replay_recording(&outcome.signature).await.unwrap();
        assert_eq!(
            BalanceRepository::new(ledger)
                .amount("alice", Currency::Platform)
                .unwrap(),
            outcome.amount
        );
    }

    #[tokio::test]
    async fn unconfirmed_transfer_is_settled_before_another_claim() {
        let h = funded();
        h.chain.set_pending_polls(4);

        assert!(matches!(
            h.service.claim_airdrop("alice").await,
            Err(SettlementError::ConfirmationUnknown { .. })
        ));
        assert!(!ClaimRepository::new(h.service.ledger()).has_claimed("alice").unwrap());
        assert!(matches!(
            h.service.claim_airdrop("alice").await,
            Err(SettlementError::SettlementPending { .. })
        ));

        assert!(matches!(
            h.service.claim_airdrop("alice").await,
            Err(SettlementError::AlreadyClaimed)
        ));
        assert_eq!(
            BalanceRepository::new(h.service.ledger())
                .amount("alice", Currency::Platform)
                .unwrap(),
            h.service.config().airdrop_amount
        );
        assert_eq!(h.chain.submitted().len(), 1);
    }
}
