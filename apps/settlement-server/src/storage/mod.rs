// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Storage Module
//!
//! Persistent off-chain state in a single embedded redb file.
//!
//! ## What Lives Here
//!
//! ```text
//! custodial accounts   user → encrypted keypair + address
//! balances             off-chain reward balances per (owner, chain, currency)
//! payments / unlocks   confirmed content purchases and the access they grant
//! claims               airdrop flag, reservations and the global counter
//! distributions        one log per reward period
//! ledger events        append-only record of every balance movement
//! discrepancies        confirmed transactions whose ledger write failed
//! catalog              content payout addresses and chapter lock policies
//! ```
//!
//! ## Important Notes
//!
//! - Signing keys are stored only as vault ciphertext
//! - Writes that must be atomic share one redb write transaction
//! - Rows keyed by transaction signature make recording idempotent

pub mod ledger_db;
pub mod repository;

pub use ledger_db::{is_valid_key_part, LedgerDb, LedgerError, LedgerResult};
pub use repository::{
    AccountRepository, AccountResponse, BalanceRepository, CatalogRepository, Chapter,
    ClaimEligibility, ClaimRepository, Content, CustodialAccount, Discrepancy, DiscrepancyCause,
    DiscrepancyRepository, DistributionLog, DistributionRepository, EventRepository, LedgerEvent,
    LedgerEventKind, OffChainBalance, PaymentRecord, PendingRecord, RecipientShare, RecordOutcome,
    Resolution, ReserveOutcome, UnlockRecord, UnlockRepository,
};
