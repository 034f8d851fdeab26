// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Reward distribution logs and the weekly score they rank on.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::balances::credit_in;
use super::events::{insert_event_in, LedgerEvent, LedgerEventKind};
use crate::models::Currency;
use crate::storage::ledger_db::{
    decode, encode, LedgerDb, LedgerError, LedgerResult, BALANCES, DISTRIBUTIONS, LEDGER_EVENTS,
    REWARD_METRICS,
};

/// One recipient's line in a distribution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecipientShare {
    pub user_id: String,
    /// 1 = best
    pub rank: u32,
    pub weight: u64,
    pub amount: u64,
}

/// Audit row written once per distribution period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DistributionLog {
    /// Period key, e.g. `2026-W42`
    pub period: String,
    pub currency: Currency,
    pub decimals: u8,
    pub total_amount: u64,
    pub distributed_amount: u64,
    /// Flooring leftover that was not handed out
    pub undistributed_amount: u64,
    pub recipient_count: u32,
    pub recipients: Vec<RecipientShare>,
    pub distributed_at: DateTime<Utc>,
}

pub struct DistributionRepository<'a> {
    db: &'a LedgerDb,
}

impl<'a> DistributionRepository<'a> {
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    pub fn get(&self, period: &str) -> LedgerResult<Option<DistributionLog>> {
        self.db.read(|txn| {
            let table = txn.open_table(DISTRIBUTIONS)?;
            table
                .get(period)?
                .map(|value| decode(value.value()))
                .transpose()
        })
    }

    /// Most recent distributed period. Period keys sort chronologically.
    pub fn latest_period(&self) -> LedgerResult<Option<String>> {
        self.db.read(|txn| {
            let table = txn.open_table(DISTRIBUTIONS)?;
            let latest = table.last()?.map(|(key, _)| key.value().to_string());
            Ok(latest)
        })
    }

    /// Credit every recipient, append one event each and write the log,
    /// all in one transaction.
    ///
    /// Fails with `AlreadyExists` if the period was already distributed.
    pub fn apply(&self, log: &DistributionLog) -> LedgerResult<()> {
        self.db.write(|txn| {
            let mut logs = txn.open_table(DISTRIBUTIONS)?;
            if logs.get(log.period.as_str())?.is_some() {
                return Err(LedgerError::AlreadyExists(format!(
                    "distribution {}",
                    log.period
                )));
            }

            let mut balances = txn.open_table(BALANCES)?;
            let mut events = txn.open_table(LEDGER_EVENTS)?;
            for share in log.recipients.iter().filter(|s| s.amount > 0) {
                credit_in(
                    &mut balances,
                    &share.user_id,
                    log.currency,
                    log.decimals,
                    share.amount,
                    log.distributed_at,
                )?;
                insert_event_in(
                    &mut events,
                    &LedgerEvent {
                        event_id: format!("reward:{}:{}", log.period, share.user_id),
                        owner_id: share.user_id.clone(),
                        kind: LedgerEventKind::RewardCredit,
                        currency: log.currency,
                        amount: share.amount,
                        signature: None,
                        created_at: log.distributed_at,
                    },
                )?;
            }

            let bytes = encode(log)?;
            logs.insert(log.period.as_str(), bytes.as_slice())?;
            Ok(())
        })
    }

    /// Top `limit` users by weekly score. Zero scores are skipped and ties
    /// are broken by user id.
    pub fn ranked_candidates(&self, limit: usize) -> LedgerResult<Vec<(String, u64)>> {
        let mut scores = self.db.read(|txn| {
            let table = txn.open_table(REWARD_METRICS)?;
            let mut scores = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                if value.value() > 0 {
                    scores.push((key.value().to_string(), value.value()));
                }
            }
            Ok(scores)
        })?;

        scores.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scores.truncate(limit);
        Ok(scores)
    }

    /// Add to a user's weekly score.
    pub fn add_score(&self, user_id: &str, points: u64) -> LedgerResult<u64> {
        self.db.write(|txn| {
            let mut table = txn.open_table(REWARD_METRICS)?;
            let current = table.get(user_id)?.map_or(0, |v| v.value());
            let next = current.saturating_add(points);
            table.insert(user_id, next)?;
            Ok(next)
        })
    }

    pub fn score(&self, user_id: &str) -> LedgerResult<u64> {
        self.db.read(|txn| {
            let table = txn.open_table(REWARD_METRICS)?;
            Ok(table.get(user_id)?.map_or(0, |v| v.value()))
        })
    }

    /// Take a ranked snapshot off the weekly scores. Points added after the
    /// snapshot was read stay on the score.
    pub fn subtract_scores(&self, consumed: &[(String, u64)]) -> LedgerResult<()> {
        self.db.write(|txn| {
            let mut table = txn.open_table(REWARD_METRICS)?;
            for (user_id, points) in consumed {
                let current = table.get(user_id.as_str())?.map_or(0, |v| v.value());
                table.insert(user_id.as_str(), current.saturating_sub(*points))?;
            }
            Ok(())
        })
    }
}
