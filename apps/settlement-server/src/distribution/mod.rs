// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Distribution Scheduler
//!
//! Splits a periodic reward pool across the top readers by rank and
//! credits the shares to their off-chain balances.
//!
//! Rank `i` of `n` (1 = best) has weight `n - i + 1` and receives
//! `floor(pool * weight / Σ weights)`. Flooring leftovers are not handed
//! out; the period's log records them as `undistributed_amount`.
//!
//! A period is distributed at most once: the log row for the period is
//! written in the same transaction as the credits.

mod runner;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::Currency;
use crate::storage::{
    DistributionLog, DistributionRepository, LedgerDb, LedgerError, RecipientShare,
};

pub use runner::{period_key, period_start, DistributionRunner};

#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("period {0} was already distributed")]
    AlreadyDistributed(String),

    #[error("storage error: {0}")]
    Storage(#[from] LedgerError),
}

/// Reward pool parameters.
#[derive(Debug, Clone)]
pub struct DistributionConfig {
    pub currency: Currency,
    pub decimals: u8,
    /// Pool per period, in minor units
    pub pool_amount: u64,
    /// Maximum number of ranked recipients
    pub top_n: usize,
}

/// Weights `[n, n-1, .., 1]` for ranks 1..=n.
pub fn rank_weights(n: usize) -> Vec<u64> {
    (1..=n as u64).rev().collect()
}

/// `floor(pool * w_i / Σw)` for each weight. All zeros if the weights sum
/// to zero.
pub fn compute_shares(weights: &[u64], pool: u64) -> Vec<u64> {
    let total: u128 = weights.iter().map(|&w| w as u128).sum();
    if total == 0 {
        return vec![0; weights.len()];
    }
    weights
        .iter()
        // share <= pool, so the narrowing cannot truncate
        .map(|&w| (pool as u128 * w as u128 / total) as u64)
        .collect()
}

pub struct DistributionScheduler {
    ledger: Arc<LedgerDb>,
    config: DistributionConfig,
}

impl DistributionScheduler {
    pub fn new(ledger: Arc<LedgerDb>, config: DistributionConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    /// Distribute the pool for `period` to the current ranking.
    pub fn run_period(&self, period: &str) -> Result<DistributionLog, DistributionError> {
        self.run_period_at(period, Utc::now())
    }

    fn run_period_at(
        &self,
        period: &str,
        now: DateTime<Utc>,
    ) -> Result<DistributionLog, DistributionError> {
        let repo = DistributionRepository::new(&self.ledger);
        if repo.get(period)?.is_some() {
            return Err(DistributionError::AlreadyDistributed(period.to_string()));
        }

        let ranked = repo.ranked_candidates(self.config.top_n)?;
        let weights = rank_weights(ranked.len());
        let shares = compute_shares(&weights, self.config.pool_amount);

        let recipients: Vec<RecipientShare> = ranked
            .iter()
            .zip(weights.iter().zip(&shares))
            .enumerate()
            .map(|(index, ((user_id, _), (&weight, &amount)))| RecipientShare {
                user_id: user_id.clone(),
                rank: index as u32 + 1,
                weight,
                amount,
            })
            .collect();

        let distributed_amount: u64 = shares.iter().sum();
        let log = DistributionLog {
            period: period.to_string(),
            currency: self.config.currency,
            decimals: self.config.decimals,
            total_amount: self.config.pool_amount,
            distributed_amount,
            undistributed_amount: self.config.pool_amount - distributed_amount,
            recipient_count: recipients.len() as u32,
            recipients,
            distributed_at: now,
        };

        match repo.apply(&log) {
            Ok(()) => {}
            Err(LedgerError::AlreadyExists(_)) => {
                return Err(DistributionError::AlreadyDistributed(period.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            period = %period,
            recipients = log.recipient_count,
            distributed = log.distributed_amount,
            undistributed = log.undistributed_amount,
            "Reward distribution applied"
        );

        if let Err(err) = repo.subtract_scores(&ranked) {
            tracing::error!(
                period = %period,
                error = %err,
                "Failed to deduct weekly scores after distribution"
            );
        }

        Ok(log)
    }

    pub fn log(&self, period: &str) -> Result<Option<DistributionLog>, DistributionError> {
        Ok(DistributionRepository::new(&self.ledger).get(period)?)
    }

    pub fn latest_period(&self) -> Result<Option<String>, DistributionError> {
        Ok(DistributionRepository::new(&self.ledger).latest_period()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BalanceRepository;

    fn new_scheduler(pool_amount: u64, top_n: usize) -> (DistributionScheduler, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerDb::open(&dir.path().join("ledger.redb")).unwrap());
        let config = DistributionConfig {
            currency: Currency::Platform,
            decimals: 6,
            pool_amount,
            top_n,
        };
        (DistributionScheduler::new(ledger, config), dir)
    }

    #[test]
    fn weights_descend_to_one() {
        assert_eq!(rank_weights(4), [4, 3, 2, 1]);
        assert!(rank_weights(0).is_empty());
    }

    #[test]
    fn ten_rank_pool_matches_published_example() {
        let weights = rank_weights(10);
        assert_eq!(weights.iter().sum::<u64>(), 55);

        let shares = compute_shares(&weights, 5_000_000);
        assert_eq!(shares[0], 909_090);
        assert_eq!(shares[9], 90_909);
        assert!(shares.iter().sum::<u64>() <= 5_000_000);
        assert!(shares.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn shares_never_exceed_pool() {
        for n in 1..=25 {
            for pool in [1u64, 7, 999, 1_000_000, u64::MAX] {
                let shares = compute_shares(&rank_weights(n), pool);
                let total: u128 = shares.iter().map(|&s| s as u128).sum();
                assert!(total <= pool as u128, "n={n} pool={pool}");
            }
        }
        assert_eq!(compute_shares(&[0, 0], 100), [0, 0]);
    }

    #[test]
    fn run_credits_ranked_users_and_resets_scores() {
        let (scheduler, _dir) = new_scheduler(600, 10);
        let repo = DistributionRepository::new(&scheduler.ledger);
        repo.add_score("alice", 30).unwrap();
        repo.add_score("bob", 20).unwrap();
        repo.add_score("carol", 10).unwrap();

        let log = scheduler.run_period("2026-W42").unwrap();
        assert_eq!(log.recipient_count, 3);
        assert_eq!(log.recipients[0].user_id, "alice");
        assert_eq!(log.recipients[0].weight, 3);
        assert_eq!(log.distributed_amount, 600);
        assert_eq!(log.undistributed_amount, 0);

        let balances = BalanceRepository::new(&scheduler.ledger);
        assert_eq!(balances.amount("alice", Currency::Platform).unwrap(), 300);
        assert_eq!(balances.amount("bob", Currency::Platform).unwrap(), 200);
        assert_eq!(balances.amount("carol", Currency::Platform).unwrap(), 100);
        assert_eq!(repo.score("alice").unwrap(), 0);
        assert!(scheduler.log("2026-W42").unwrap().is_some());
    }

    #[test]
    fn leftover_is_recorded_not_distributed() {
        let (scheduler, _dir) = new_scheduler(100, 10);
        let repo = DistributionRepository::new(&scheduler.ledger);
        for (user, score) in [("a", 3), ("b", 2), ("c", 1)] {
            repo.add_score(user, score).unwrap();
        }

        let log = scheduler.run_period("2026-W01").unwrap();
        // 100*3/6 = 50, 100*2/6 = 33, 100*1/6 = 16
        assert_eq!(log.distributed_amount, 99);
        assert_eq!(log.undistributed_amount, 1);
    }

    #[test]
    fn period_is_distributed_once() {
        let (scheduler, _dir) = new_scheduler(1_000, 5);
        let repo = DistributionRepository::new(&scheduler.ledger);
        repo.add_score("alice", 1).unwrap();
        scheduler.run_period("2026-W10").unwrap();

        repo.add_score("alice", 5).unwrap();
        assert!(matches!(
            scheduler.run_period("2026-W10"),
            Err(DistributionError::AlreadyDistributed(_))
        ));
        let balances = BalanceRepository::new(&scheduler.ledger);
        assert_eq!(balances.amount("alice", Currency::Platform).unwrap(), 1_000);
        assert_eq!(repo.score("alice").unwrap(), 5);
    }

    #[test]
    fn top_n_limits_recipients_and_empty_ranking_still_logs() {
        let (scheduler, _dir) = new_scheduler(1_000, 2);
        let repo = DistributionRepository::new(&scheduler.ledger);
        for (user, score) in [("a", 9), ("b", 8), ("c", 7)] {
            repo.add_score(user, score).unwrap();
        }
        let log = scheduler.run_period("2026-W11").unwrap();
        assert_eq!(log.recipient_count, 2);
        assert_eq!(repo.score("c").unwrap(), 7);

        let (empty, _empty_dir) = new_scheduler(500, 10);
        let log = empty.run_period("2026-W11").unwrap();
        assert_eq!(log.recipient_count, 0);
        assert_eq!(log.undistributed_amount, log.total_amount);
    }
}
