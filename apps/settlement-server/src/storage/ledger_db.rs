// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `custodial_accounts`: user_id → CustodialAccount
//! - `address_owners`: chain address → user_id
//! - `balances`: owner|chain|currency → OffChainBalance
//! - `unlocks`: user|content|chapter_ref|signature → UnlockRecord
//! - `payments`: signature → PaymentRecord
//! - `claims`: user_id → ClaimEligibility
//! - `claim_reservations`: user_id → reservation timestamp
//! - `counters`: name → u64
//! - `distributions`: period → DistributionLog
//! - `ledger_events`: event_id → LedgerEvent
//! - `discrepancies`: signature → Discrepancy
//! - `contents` / `chapters`: catalog rows
//! - `reward_metrics`: user_id → weekly score
//!
//! Values are JSON bytes. Composite keys are joined with `KEY_SEP`, a control
//! character. Ids used as key parts are checked with [`is_valid_key_part`]
//! where they enter the service.

use std::path::Path;

use redb::{Database, ReadTransaction, ReadableDatabase, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const CUSTODIAL_ACCOUNTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("custodial_accounts");
pub(crate) const ADDRESS_OWNERS: TableDefinition<&str, &str> =
    TableDefinition::new("address_owners");
pub(crate) const BALANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("balances");
pub(crate) const UNLOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("unlocks");
pub(crate) const PAYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("payments");
pub(crate) const CLAIMS: TableDefinition<&str, &[u8]> = TableDefinition::new("claims");
pub(crate) const CLAIM_RESERVATIONS: TableDefinition<&str, i64> =
    TableDefinition::new("claim_reservations");
pub(crate) const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");
pub(crate) const DISTRIBUTIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("distributions");
pub(crate) const LEDGER_EVENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("ledger_events");
pub(crate) const DISCREPANCIES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("discrepancies");
pub(crate) const CONTENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("contents");
pub(crate) const CHAPTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("chapters");
pub(crate) const REWARD_METRICS: TableDefinition<&str, u64> =
    TableDefinition::new("reward_metrics");

/// Separator for composite keys.
pub(crate) const KEY_SEP: char = '\u{1f}';

/// Whether `part` can be used in a composite key: non-empty and free of
/// control characters, which includes `KEY_SEP`.
pub fn is_valid_key_part(part: &str) -> bool {
    !part.is_empty() && !part.chars().any(char::is_control)
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u64, requested: u64 },

    #[error("arithmetic overflow on {0}")]
    Overflow(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Key / Value Helpers
// =============================================================================

/// Join key parts with the composite key separator.
pub(crate) fn composite_key(parts: &[&str]) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEP);
        }
        key.push_str(part);
    }
    key
}

/// Prefix matching every key that starts with `parts`.
pub(crate) fn key_prefix(parts: &[&str]) -> String {
    let mut prefix = composite_key(parts);
    prefix.push(KEY_SEP);
    prefix
}

pub(crate) fn encode<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> LedgerResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Off-chain accounting ledger and custodial account registry.
///
/// Each record family lives in `storage::repository`, as additional
/// `impl LedgerDb` blocks next to its record types.
pub struct LedgerDb {
    db: Database,
    #[cfg(test)]
    write_fault: std::sync::Mutex<Option<u32>>,
}

impl LedgerDb {
    /// Open (or create) the ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CUSTODIAL_ACCOUNTS)?;
            let _ = write_txn.open_table(ADDRESS_OWNERS)?;
            let _ = write_txn.open_table(BALANCES)?;
            let _ = write_txn.open_table(UNLOCKS)?;
            let _ = write_txn.open_table(PAYMENTS)?;
            let _ = write_txn.open_table(CLAIMS)?;
            let _ = write_txn.open_table(CLAIM_RESERVATIONS)?;
            let _ = write_txn.open_table(COUNTERS)?;
            let _ = write_txn.open_table(DISTRIBUTIONS)?;
            let _ = write_txn.open_table(LEDGER_EVENTS)?;
            let _ = write_txn.open_table(DISCREPANCIES)?;
            let _ = write_txn.open_table(CONTENTS)?;
            let _ = write_txn.open_table(CHAPTERS)?;
            let _ = write_txn.open_table(REWARD_METRICS)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            #[cfg(test)]
            write_fault: std::sync::Mutex::new(None),
        })
    }

    /// Run `f` inside one write transaction; commits only if `f` succeeds.
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        #[cfg(test)]
        self.take_write_fault()?;

        let write_txn = self.db.begin_write()?;
        let out = f(&write_txn)?;
        write_txn.commit()?;
        Ok(out)
    }

    /// Run `f` against a consistent read snapshot.
    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&ReadTransaction) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let read_txn = self.db.begin_read()?;
        f(&read_txn)
    }

    /// Cheap liveness probe used by the readiness endpoint.
    pub fn health_check(&self) -> LedgerResult<()> {
        self.read(|txn| {
            let _ = txn.open_table(COUNTERS)?;
            Ok(())
        })
    }
}

#[cfg(test)]
impl LedgerDb {
    /// Let `skipped` writes through, then fail the next one with an I/O error.
    pub(crate) fn fail_write_after(&self, skipped: u32) {
        *self.write_fault.lock().unwrap() = Some(skipped);
    }

    fn take_write_fault(&self) -> LedgerResult<()> {
        let mut fault = self.write_fault.lock().unwrap();
        match *fault {
            Some(0) => {
                *fault = None;
                Err(LedgerError::RedbStorage(redb::StorageError::Io(
                    std::io::Error::other("injected write failure"),
                )))
            }
            Some(n) => {
                *fault = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) fn temp_ledger() -> (LedgerDb, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = LedgerDb::open(&dir.path().join("ledger.redb")).unwrap();
    (db, dir)
}
