// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Reconciliation of parked settlement records.
//!
//! Every pending record is keyed on the transaction signature, so a replay
//! that partially succeeded before can be run again safely. Entries whose
//! outcome was unknown are checked against the chain first: confirmed ones
//! are recorded, ones that can no longer land are closed without writes.

use chrono::Utc;
use solana_sdk::signature::Signature;

use super::airdrop::airdrop_event_id;
use super::{SettlementError, SettlementResult, SettlementService};
use crate::chain::SignatureState;
use crate::models::Currency;
use crate::storage::{
    BalanceRepository, ClaimRepository, Discrepancy, DiscrepancyCause, DiscrepancyRepository,
    LedgerEvent, LedgerEventKind, PendingRecord, Resolution, UnlockRepository,
};

impl SettlementService {
    pub fn discrepancies(&self, include_resolved: bool) -> SettlementResult<Vec<Discrepancy>> {
        Ok(DiscrepancyRepository::new(&self.ledger).list(include_resolved)?)
    }

    /// Reconcile the entry for `signature`.
    ///
    /// Fails with `SettlementPending` while the transaction may still land.
    pub async fn replay_recording(&self, signature: &str) -> SettlementResult<Discrepancy> {
        let discrepancy = DiscrepancyRepository::new(&self.ledger)
            .get(signature)?
            .ok_or_else(|| SettlementError::NotFound(format!("discrepancy {signature}")))?;
        if discrepancy.resolved_at.is_some() {
            return Ok(discrepancy);
        }

        self.reconcile(&discrepancy)
            .await?
            .ok_or_else(|| SettlementError::SettlementPending {
                signature: signature.to_string(),
            })
    }

    /// Reconcile the user's open entries of `kind` before a new request of
    /// that kind builds a transaction.
    pub(super) async fn settle_open(&self, user_id: &str, kind: &str) -> SettlementResult<()> {
        let open = DiscrepancyRepository::new(&self.ledger).open_for(user_id, kind)?;
        for discrepancy in open {
            let signature = discrepancy.signature.clone();
            match self.reconcile(&discrepancy).await {
                Ok(Some(_)) => {}
                Ok(None) => return Err(SettlementError::SettlementPending { signature }),
                Err(err) => {
                    tracing::warn!(
                        user_id = %user_id,
                        signature = %signature,
                        error = %err,
                        "Reconciliation attempt failed"
                    );
                    return Err(SettlementError::SettlementPending { signature });
                }
            }
        }
        Ok(())
    }

    /// Close an open entry, or `None` if its transaction may still land.
    async fn reconcile(&self, discrepancy: &Discrepancy) -> SettlementResult<Option<Discrepancy>> {
        let signature = discrepancy.signature.as_str();
        if let DiscrepancyCause::Unconfirmed {
            last_valid_block_height,
        } = discrepancy.cause
        {
            let parsed: Signature = signature.parse().map_err(|_| {
                SettlementError::Validation(format!("invalid stored signature {signature}"))
            })?;
            let landed = match self.chain.signature_status(&parsed).await? {
                SignatureState::Confirmed => true,
                SignatureState::Failed(_) => false,
                SignatureState::Pending => {
                    if self.chain.block_height().await? <= last_valid_block_height {
                        return Ok(None);
                    }
                    self.chain.signature_status(&parsed).await? == SignatureState::Confirmed
                }
            };
            if !landed {
                return self.close_not_landed(discrepancy).map(Some);
            }
        }

        let now = Utc::now();
        self.apply_pending(signature, &discrepancy.pending)?;
        let resolved = DiscrepancyRepository::new(&self.ledger).mark_resolved(
            signature,
            Resolution::Recorded,
            now,
        )?;
        tracing::info!(
            signature = %signature,
            kind = resolved.pending.kind(),
            "Discrepancy reconciled"
        );
        Ok(Some(resolved))
    }

    fn close_not_landed(&self, discrepancy: &Discrepancy) -> SettlementResult<Discrepancy> {
        if let PendingRecord::AirdropClaim { user_id, .. } = &discrepancy.pending {
            self.release_reservation(user_id);
        }
        let resolved = DiscrepancyRepository::new(&self.ledger).mark_resolved(
            &discrepancy.signature,
            Resolution::NotLanded,
            Utc::now(),
        )?;
        tracing::info!(
            signature = %discrepancy.signature,
            kind = resolved.pending.kind(),
            "Transaction did not land; discrepancy closed without writes"
        );
        Ok(resolved)
    }

    fn apply_pending(&self, signature: &str, pending: &PendingRecord) -> SettlementResult<()> {
        let now = Utc::now();
        match pending {
            PendingRecord::Unlock { payment, unlock } => {
                UnlockRepository::new(&self.ledger).record(payment, unlock)?;
            }
            PendingRecord::AirdropClaim {
                user_id,
                currency,
                decimals,
                amount,
            } => {
                ClaimRepository::new(&self.ledger).mark_claimed(user_id, signature, now)?;
                self.credit_airdrop(signature, user_id, *currency, *decimals, *amount)?;
            }
            PendingRecord::AirdropCredit {
                user_id,
                currency,
                decimals,
                amount,
            } => {
                self.credit_airdrop(signature, user_id, *currency, *decimals, *amount)?;
            }
            PendingRecord::Withdrawal {
                user_id,
                currency,
                amount,
            } => {
                BalanceRepository::new(&self.ledger).debit_with_event(&LedgerEvent {
                    event_id: signature.to_string(),
                    owner_id: user_id.clone(),
                    kind: LedgerEventKind::Withdrawal,
                    currency: *currency,
                    amount: *amount,
                    signature: Some(signature.to_string()),
                    created_at: now,
                })?;
            }
        }
        Ok(())
    }

    fn credit_airdrop(
        &self,
        signature: &str,
        user_id: &str,
        currency: Currency,
        decimals: u8,
        amount: u64,
    ) -> SettlementResult<()> {
        BalanceRepository::new(&self.ledger).credit_with_event(
            &LedgerEvent {
                event_id: airdrop_event_id(signature),
                owner_id: user_id.to_string(),
                kind: LedgerEventKind::AirdropCredit,
                currency,
                amount,
                signature: Some(signature.to_string()),
                created_at: Utc::now(),
            },
            decimals,
        )?;
        Ok(())
    }
}
