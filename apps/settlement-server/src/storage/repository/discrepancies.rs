// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Reconciliation queue.
//!
//! Two situations park the exact records still to be written here, keyed by
//! signature:
//!
//! - a transaction confirmed on-chain but the ledger write after it failed
//! - a transaction was submitted but its outcome could not be observed
//!   before polling gave up
//!
//! Entries stay open until reconciled, and an open entry blocks the same
//! kind of request for its user.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::unlocks::{PaymentRecord, UnlockRecord};
use crate::models::Currency;
use crate::storage::ledger_db::{
    decode, encode, LedgerDb, LedgerError, LedgerResult, DISCREPANCIES,
};

/// Ledger writes that did not happen after a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingRecord {
    /// Payment + unlock rows
    Unlock {
        payment: PaymentRecord,
        unlock: UnlockRecord,
    },
    /// Claim flag and the off-chain credit
    AirdropClaim {
        user_id: String,
        currency: Currency,
        decimals: u8,
        amount: u64,
    },
    /// Off-chain credit only (flag already set)
    AirdropCredit {
        user_id: String,
        currency: Currency,
        decimals: u8,
        amount: u64,
    },
    /// Balance debit + withdrawal event
    Withdrawal {
        user_id: String,
        currency: Currency,
        amount: u64,
    },
}

impl PendingRecord {
    /// User the records belong to.
    pub fn user_id(&self) -> &str {
        match self {
            PendingRecord::Unlock { payment, .. } => &payment.user_id,
            PendingRecord::AirdropClaim { user_id, .. }
            | PendingRecord::AirdropCredit { user_id, .. }
            | PendingRecord::Withdrawal { user_id, .. } => user_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PendingRecord::Unlock { .. } => "unlock",
            PendingRecord::AirdropClaim { .. } => "airdrop_claim",
            PendingRecord::AirdropCredit { .. } => "airdrop_credit",
            PendingRecord::Withdrawal { .. } => "withdrawal",
        }
    }
}

/// Why an entry was parked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscrepancyCause {
    /// Confirmed on-chain; only the ledger write is missing
    #[default]
    RecordingFailed,
    /// Submitted, outcome unknown until the chain is checked again
    Unconfirmed { last_valid_block_height: u64 },
}

/// How an entry was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The pending records were written
    Recorded,
    /// The transaction never landed; nothing was written
    NotLanded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Discrepancy {
    pub signature: String,
    pub pending: PendingRecord,
    #[serde(default)]
    pub cause: DiscrepancyCause,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

pub struct DiscrepancyRepository<'a> {
    db: &'a LedgerDb,
}

impl<'a> DiscrepancyRepository<'a> {
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    /// Park a discrepancy. An existing entry for the signature is kept.
    pub fn record(&self, discrepancy: &Discrepancy) -> LedgerResult<()> {
        self.db.write(|txn| {
            let mut table = txn.open_table(DISCREPANCIES)?;
            if table.get(discrepancy.signature.as_str())?.is_some() {
                return Ok(());
            }
            let bytes = encode(discrepancy)?;
            table.insert(discrepancy.signature.as_str(), bytes.as_slice())?;
            Ok(())
        })
    }

    pub fn get(&self, signature: &str) -> LedgerResult<Option<Discrepancy>> {
        self.db.read(|txn| {
            let table = txn.open_table(DISCREPANCIES)?;
            table
                .get(signature)?
                .map(|value| decode(value.value()))
                .transpose()
        })
    }

    /// Open discrepancies, or all of them with `include_resolved`.
    pub fn list(&self, include_resolved: bool) -> LedgerResult<Vec<Discrepancy>> {
        let mut items: Vec<Discrepancy> = self.db.read(|txn| {
            let table = txn.open_table(DISCREPANCIES)?;
            let mut items = Vec::new();
            for entry in table.iter()? {
                let (_, value) = entry?;
                items.push(decode(value.value())?);
            }
            Ok(items)
        })?;
        items.retain(|d: &Discrepancy| include_resolved || d.resolved_at.is_none());
        items.sort_by_key(|d| d.detected_at);
        Ok(items)
    }

    /// Open entries of `kind` belonging to `user_id`.
    pub fn open_for(&self, user_id: &str, kind: &str) -> LedgerResult<Vec<Discrepancy>> {
        let mut items = self.list(false)?;
        items.retain(|d| d.pending.user_id() == user_id && d.pending.kind() == kind);
        Ok(items)
    }

    /// Close an entry. The first resolution wins.
    pub fn mark_resolved(
        &self,
        signature: &str,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> LedgerResult<Discrepancy> {
        self.db.write(|txn| {
            let mut table = txn.open_table(DISCREPANCIES)?;
            let mut discrepancy: Discrepancy = table
                .get(signature)?
                .map(|value| decode(value.value()))
                .transpose()?
                .ok_or_else(|| LedgerError::NotFound(format!("discrepancy {signature}")))?;

            if discrepancy.resolved_at.is_none() {
                discrepancy.resolved_at = Some(now);
                discrepancy.resolution = Some(resolution);
            }
            let bytes = encode(&discrepancy)?;
            table.insert(signature, bytes.as_slice())?;
            Ok(discrepancy)
        })
    }
}
