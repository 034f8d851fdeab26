// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Withdrawals of off-chain balances to the user's custodial wallet.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{SettlementError, SettlementResult, SettlementService};
use crate::chain::{parse_address, Beneficiary};
use crate::models::Currency;
use crate::storage::{BalanceRepository, LedgerEvent, LedgerEventKind, PendingRecord};

const ACTION: &str = "withdraw";

/// Parked record kind that gates a new withdrawal.
const ACTION_KIND: &str = "withdrawal";

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WithdrawalRequest {
    #[serde(skip)]
    pub user_id: String,
    pub currency: Currency,
    /// Minor units
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct WithdrawalOutcome {
    pub signature: String,
    pub amount: u64,
    pub remaining_balance: u64,
}

impl SettlementService {
    pub async fn withdraw(&self, request: WithdrawalRequest) -> SettlementResult<WithdrawalOutcome> {
        let WithdrawalRequest {
            user_id,
            currency,
            amount,
        } = request;
        let _guard = self.begin(&user_id, ACTION)?;

        let minimum = self.config.withdraw_minimum;
        if amount == 0 || amount < minimum {
            return Err(SettlementError::BelowMinimum { minimum });
        }

        // An earlier transfer that may still land must be settled first
        self.settle_open(&user_id, ACTION_KIND).await?;

        let balances = BalanceRepository::new(&self.ledger);
        self.ensure_off_chain_funds(&balances, &user_id, currency, amount)?;

        let spec = self.tokens.spec(currency);
        let treasury = self.treasury_address();
        let available = self.live_balance(&treasury, &spec).await?;
        let required = if spec.is_native() {
            amount.saturating_add(self.config.fee_reserve_lamports)
        } else {
            amount
        };
        if available < required {
            tracing::warn!(
                user_id = %user_id,
                currency = %currency,
                requested = amount,
                available,
                "Treasury cannot cover withdrawal"
            );
            return Err(SettlementError::TreasuryInsufficient);
        }

        let account = self.custodial_account(&user_id)?;
        let owner = parse_address(&account.chain_address)?;
        let unsigned = self
            .builder
            .build(&treasury, &[Beneficiary::account(owner, 1)], amount, &spec)
            .await?;

        self.ensure_off_chain_funds(&balances, &user_id, currency, amount)?;
        let pending = |_: &str| PendingRecord::Withdrawal {
            user_id: user_id.clone(),
            currency,
            amount,
        };
        let signature = self
            .sign_and_send(unsigned, &self.wallets.treasury, pending)
            .await?;

        let event = LedgerEvent {
            event_id: signature.clone(),
            owner_id: user_id.clone(),
            kind: LedgerEventKind::Withdrawal,
            currency,
            amount,
            signature: Some(signature.clone()),
            created_at: Utc::now(),
        };
        let remaining_balance = match balances.debit_with_event(&event) {
            Ok(Some(remaining)) => remaining,
            Ok(None) => balances.amount(&user_id, currency)?,
            Err(err) => {
                self.park_discrepancy(
                    &signature,
                    PendingRecord::Withdrawal {
                        user_id: user_id.clone(),
                        currency,
                        amount,
                    },
                    &err,
                );
                return Err(SettlementError::RecordingFailed { signature });
            }
        };

        tracing::info!(
            user_id = %user_id,
            signature = %signature,
            currency = %currency,
            amount,
            remaining_balance,
            "Withdrawal settled"
        );
        Ok(WithdrawalOutcome {
            signature,
            amount,
            remaining_balance,
        })
    }

    fn ensure_off_chain_funds(
        &self,
        balances: &BalanceRepository<'_>,
        user_id: &str,
        currency: Currency,
        amount: u64,
    ) -> SettlementResult<()> {
        let available = balances.amount(user_id, currency)?;
        if available < amount {
            return Err(SettlementError::InsufficientOffChainBalance {
                requested: amount,
                available,
            });
        }
        Ok(())
    }
}
