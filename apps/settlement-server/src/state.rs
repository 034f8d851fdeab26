// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::JwtVerifier;
use crate::distribution::DistributionScheduler;
use crate::settlement::SettlementService;
use crate::storage::LedgerDb;
use crate::vault::KeyVault;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub settlement: Arc<SettlementService>,
    pub distribution: Arc<DistributionScheduler>,
    pub auth: JwtVerifier,
}

impl AppState {
    pub fn new(
        settlement: Arc<SettlementService>,
        distribution: Arc<DistributionScheduler>,
        auth: JwtVerifier,
    ) -> Self {
        Self {
            settlement,
            distribution,
            auth,
        }
    }

    pub fn ledger(&self) -> &LedgerDb {
        self.settlement.ledger()
    }

    pub fn vault(&self) -> &KeyVault {
        self.settlement.vault()
    }
}

impl FromRef<AppState> for JwtVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::issue_test_token;
    use crate::distribution::DistributionConfig;
    use crate::models::Currency;
    use crate::settlement::test_support::Harness;

    pub const JWT_SECRET: &[u8] = b"router-test-secret";

    /// Router state over a seeded settlement harness.
    pub struct TestApp {
        pub harness: Harness,
        pub state: AppState,
    }

    impl TestApp {
        pub fn new() -> Self {
            let harness = Harness::new();
            let distribution = Arc::new(DistributionScheduler::new(
                harness.ledger_handle(),
                DistributionConfig {
                    currency: Currency::Platform,
                    decimals: 6,
                    pool_amount: 1_000_000,
                    top_n: 10,
                },
            ));
            let state = AppState::new(
                Arc::clone(&harness.service),
                distribution,
                JwtVerifier::new(JWT_SECRET, None),
            );
            Self { harness, state }
        }

        pub fn user_token(&self, user_id: &str) -> String {
            issue_test_token(JWT_SECRET, user_id, None)
        }

        pub fn admin_token(&self) -> String {
            issue_test_token(JWT_SECRET, "admin-1", Some("admin"))
        }
    }
}
