// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Airdrop claim eligibility.
//!
//! The `claimed` flag is upsert-once-true and is the authority on whether a
//! user has received the airdrop. A short-lived reservation row marks an
//! in-progress claim: concurrent claims for the same user fail to reserve
//! instead of submitting twice, and live reservations count against the
//! global cap so the cap cannot be overshot by parallel claimers.

use chrono::{DateTime, Duration, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::ledger_db::{
    decode, encode, LedgerDb, LedgerResult, CLAIMS, CLAIM_RESERVATIONS, COUNTERS,
};

/// Name of the global airdrop claim counter.
pub const AIRDROP_COUNTER: &str = "airdrop_claims";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClaimEligibility {
    pub user_id: String,
    pub has_claimed_airdrop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_claim_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_claim_signature: Option<String>,
}

/// Result of trying to reserve a claim slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    AlreadyClaimed,
    /// Another claim for this user holds a live reservation
    InProgress,
    CapReached,
}

pub struct ClaimRepository<'a> {
    db: &'a LedgerDb,
}

impl<'a> ClaimRepository<'a> {
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    pub fn get(&self, user_id: &str) -> LedgerResult<Option<ClaimEligibility>> {
        self.db.read(|txn| {
            let table = txn.open_table(CLAIMS)?;
            table
                .get(user_id)?
                .map(|value| decode(value.value()))
                .transpose()
        })
    }

    pub fn has_claimed(&self, user_id: &str) -> LedgerResult<bool> {
        Ok(self.get(user_id)?.is_some_and(|c| c.has_claimed_airdrop))
    }

    /// Number of completed airdrop claims.
    pub fn claim_count(&self) -> LedgerResult<u64> {
        self.db.read(|txn| {
            let table = txn.open_table(COUNTERS)?;
            Ok(table.get(AIRDROP_COUNTER)?.map_or(0, |v| v.value()))
        })
    }

    /// Atomically check the cap and the flag and take a reservation.
    ///
    /// Reservations older than `stale_after` are treated as abandoned.
    pub fn reserve(
        &self,
        user_id: &str,
        cap: u64,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> LedgerResult<ReserveOutcome> {
        let cutoff = (now - stale_after).timestamp();

        self.db.write(|txn| {
            let counters = txn.open_table(COUNTERS)?;
            let completed = counters.get(AIRDROP_COUNTER)?.map_or(0, |v| v.value());

            let mut reservations = txn.open_table(CLAIM_RESERVATIONS)?;
            let mut live_others = 0u64;
            let mut own_live = false;
            for entry in reservations.iter()? {
                let (key, value) = entry?;
                if value.value() <= cutoff {
                    continue;
                }
                if key.value() == user_id {
                    own_live = true;
                } else {
                    live_others += 1;
                }
            }

            let claims = txn.open_table(CLAIMS)?;
            let claimed = claims
                .get(user_id)?
                .map(|value| decode::<ClaimEligibility>(value.value()))
                .transpose()?
                .is_some_and(|c| c.has_claimed_airdrop);

            if completed.saturating_add(live_others) >= cap {
                return Ok(ReserveOutcome::CapReached);
            }
            if claimed {
                return Ok(ReserveOutcome::AlreadyClaimed);
            }
            if own_live {
                return Ok(ReserveOutcome::InProgress);
            }

            reservations.insert(user_id, now.timestamp())?;
            Ok(ReserveOutcome::Reserved)
        })
    }

    /// Drop a reservation without claiming.
    pub fn release(&self, user_id: &str) -> LedgerResult<()> {
        self.db.write(|txn| {
            let mut reservations = txn.open_table(CLAIM_RESERVATIONS)?;
            reservations.remove(user_id)?;
            Ok(())
        })
    }

    /// Set the claim flag, bump the counter and release the reservation.
    ///
    /// Returns `false` if the flag was already set (nothing changes).
    pub fn mark_claimed(
        &self,
        user_id: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        self.db.write(|txn| {
            let mut claims = txn.open_table(CLAIMS)?;
            let already = claims
                .get(user_id)?
                .map(|value| decode::<ClaimEligibility>(value.value()))
                .transpose()?
                .is_some_and(|c| c.has_claimed_airdrop);

            let mut reservations = txn.open_table(CLAIM_RESERVATIONS)?;
            reservations.remove(user_id)?;

            if already {
                return Ok(false);
            }

            let record = ClaimEligibility {
                user_id: user_id.to_string(),
                has_claimed_airdrop: true,
                last_claim_timestamp: Some(now),
                last_claim_signature: Some(signature.to_string()),
            };
            let bytes = encode(&record)?;
            claims.insert(user_id, bytes.as_slice())?;

            let mut counters = txn.open_table(COUNTERS)?;
            let count = counters.get(AIRDROP_COUNTER)?.map_or(0, |v| v.value());
            counters.insert(AIRDROP_COUNTER, count.saturating_add(1))?;

            Ok(true)
        })
    }
}
