// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the ledger database.
//!
//! Each repository borrows the `LedgerDb` and owns the records of one
//! family. Multi-table writes that must be atomic (payment + unlock,
//! debit + event, credits + distribution log) live in the repository that
//! owns the primary record.

pub mod accounts;
pub mod balances;
pub mod catalog;
pub mod claims;
pub mod discrepancies;
pub mod distributions;
pub mod events;
pub mod unlocks;

pub use accounts::{AccountRepository, AccountResponse, CustodialAccount};
pub use balances::{BalanceRepository, OffChainBalance};
pub use catalog::{CatalogRepository, Chapter, Content};
pub use claims::{ClaimEligibility, ClaimRepository, ReserveOutcome, AIRDROP_COUNTER};
pub use discrepancies::{
    Discrepancy, DiscrepancyCause, DiscrepancyRepository, PendingRecord, Resolution,
};
pub use distributions::{DistributionLog, DistributionRepository, RecipientShare};
pub use events::{EventRepository, LedgerEvent, LedgerEventKind};
pub use unlocks::{PaymentRecord, RecordOutcome, UnlockRecord, UnlockRepository};
