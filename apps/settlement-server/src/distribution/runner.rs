// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Background task that distributes each completed ISO week once.
//!
//! Every tick distributes the completed weeks after the latest logged
//! period, oldest first, so weeks missed while the service was down are
//! caught up. Without any log only the previous week is due.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DistributionError, DistributionScheduler};

/// Upper bound on weeks distributed by one tick.
const MAX_CATCH_UP_WEEKS: usize = 52;

/// ISO week key, e.g. `2026-W42`.
pub fn period_key(at: DateTime<Utc>) -> String {
    at.format("%G-W%V").to_string()
}

/// Monday of the ISO week named by `key`.
pub fn period_start(key: &str) -> Option<NaiveDate> {
    let (year, week) = key.split_once("-W")?;
    if week.len() != 2 {
        return None;
    }
    NaiveDate::from_isoywd_opt(year.parse().ok()?, week.parse().ok()?, Weekday::Mon)
}

pub struct DistributionRunner {
    scheduler: Arc<DistributionScheduler>,
    interval: Duration,
}

impl DistributionRunner {
    pub fn new(scheduler: Arc<DistributionScheduler>, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// ```rust,ignore
    /// tokio::spawn(runner.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Distribution runner starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Distribution runner shutting down");
                return;
            }

            self.tick(Utc::now());

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Distribution runner shutting down");
                    return;
                }
            }
        }
    }

    fn tick(&self, now: DateTime<Utc>) {
        let periods = match self.due_periods(now) {
            Ok(periods) => periods,
            Err(err) => {
                warn!(error = %err, "Distribution runner: could not read distribution logs");
                return;
            }
        };

        for period in periods {
            match self.scheduler.run_period(&period) {
                Ok(log) => info!(
                    period = %log.period,
                    recipients = log.recipient_count,
                    "Distribution runner: period distributed"
                ),
                Err(DistributionError::AlreadyDistributed(_)) => {
                    debug!(period = %period, "Distribution runner: period already distributed");
                }
                Err(err) => {
                    warn!(
                        period = %period,
                        error = %err,
                        "Distribution runner: distribution failed"
                    );
                    return;
                }
            }
        }
    }

    /// Completed weeks after the latest logged period, oldest first.
    fn due_periods(&self, now: DateTime<Utc>) -> Result<Vec<String>, DistributionError> {
        let last_complete = (now - chrono::Duration::weeks(1)).date_naive();
        let fallback = || vec![period_key(now - chrono::Duration::weeks(1))];

        let Some(latest) = self.scheduler.latest_period()? else {
            return Ok(fallback());
        };
        let Some(start) = period_start(&latest) else {
            warn!(period = %latest, "Distribution runner: latest period key is not an ISO week");
            return Ok(fallback());
        };

        let mut periods = Vec::new();
        let mut week = start + chrono::Duration::weeks(1);
        while week <= last_complete && periods.len() < MAX_CATCH_UP_WEEKS {
            periods.push(week.format("%G-W%V").to_string());
            week += chrono::Duration::weeks(1);
        }
        if periods.len() > 1 {
            info!(
                from = %periods[0],
                weeks = periods.len(),
                "Distribution runner: catching up missed periods"
            );
        }
        Ok(periods)
    }
}
