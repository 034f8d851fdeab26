// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Off-chain balances.
//!
//! One row per `(owner, chain, currency)`. Rows are created lazily on the
//! first credit and amounts are unsigned: a debit that would go below zero
//! is rejected with `LedgerError::InsufficientBalance`.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, Table};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::events::{insert_event_in, LedgerEvent};
use crate::models::{Currency, CHAIN_TAG};
use crate::storage::ledger_db::{
    composite_key, decode, encode, key_prefix, LedgerDb, LedgerError, LedgerResult, BALANCES,
    LEDGER_EVENTS,
};

/// Off-chain balance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OffChainBalance {
    pub owner_id: String,
    pub chain: String,
    pub currency: Currency,
    /// Minor units
    pub amount: u64,
    pub decimals: u8,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn balance_key(owner_id: &str, currency: Currency) -> String {
    composite_key(&[owner_id, CHAIN_TAG, currency.tag()])
}

fn load(
    table: &Table<'_, &'static str, &'static [u8]>,
    key: &str,
) -> LedgerResult<Option<OffChainBalance>> {
    table.get(key)?.map(|value| decode(value.value())).transpose()
}

/// Credit `amount` inside an open write transaction, inserting the row if
/// it does not exist. Returns the new balance.
pub(crate) fn credit_in(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    owner_id: &str,
    currency: Currency,
    decimals: u8,
    amount: u64,
    now: DateTime<Utc>,
) -> LedgerResult<u64> {
    let key = balance_key(owner_id, currency);
    let mut row = load(table, &key)?.unwrap_or_else(|| OffChainBalance {
        owner_id: owner_id.to_string(),
        chain: CHAIN_TAG.to_string(),
        currency,
        amount: 0,
        decimals,
        updated_at: now,
    });

    row.amount = row
        .amount
        .checked_add(amount)
        .ok_or_else(|| LedgerError::Overflow(format!("balance of {owner_id}")))?;
    row.updated_at = now;

    let bytes = encode(&row)?;
    table.insert(key.as_str(), bytes.as_slice())?;
    Ok(row.amount)
}

/// Debit `amount` inside an open write transaction. Returns the new balance.
pub(crate) fn debit_in(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    owner_id: &str,
    currency: Currency,
    amount: u64,
    now: DateTime<Utc>,
) -> LedgerResult<u64> {
    let key = balance_key(owner_id, currency);
    let mut row = load(table, &key)?.ok_or(LedgerError::InsufficientBalance {
        available: 0,
        requested: amount,
    })?;

    row.amount = row
        .amount
        .checked_sub(amount)
        .ok_or(LedgerError::InsufficientBalance {
            available: row.amount,
            requested: amount,
        })?;
    row.updated_at = now;

    let bytes = encode(&row)?;
    table.insert(key.as_str(), bytes.as_slice())?;
    Ok(row.amount)
}

/// Access to off-chain balances.
pub struct BalanceRepository<'a> {
    db: &'a LedgerDb,
}

impl<'a> BalanceRepository<'a> {
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    /// Current balance in minor units (0 when no row exists).
    pub fn amount(&self, owner_id: &str, currency: Currency) -> LedgerResult<u64> {
        Ok(self.get(owner_id, currency)?.map_or(0, |row| row.amount))
    }

    pub fn get(&self, owner_id: &str, currency: Currency) -> LedgerResult<Option<OffChainBalance>> {
        let key = balance_key(owner_id, currency);
        self.db.read(|txn| {
            let table = txn.open_table(BALANCES)?;
            table
                .get(key.as_str())?
                .map(|value| decode(value.value()))
                .transpose()
        })
    }

    /// All balance rows for an owner on this chain.
    pub fn list(&self, owner_id: &str) -> LedgerResult<Vec<OffChainBalance>> {
        let prefix = key_prefix(&[owner_id, CHAIN_TAG]);
        self.db.read(|txn| {
            let table = txn.open_table(BALANCES)?;
            let mut rows = Vec::new();
            for entry in table.range(prefix.as_str()..)? {
                let (key, value) = entry?;
                if !key.value().starts_with(prefix.as_str()) {
                    break;
                }
                rows.push(decode(value.value())?);
            }
            Ok(rows)
        })
    }

    /// Credit the event's amount and append the event in one transaction.
    ///
    /// Idempotent on the event id: returns `false` if it was already applied.
    pub fn credit_with_event(&self, event: &LedgerEvent, decimals: u8) -> LedgerResult<bool> {
        self.db.write(|txn| {
            let mut events = txn.open_table(LEDGER_EVENTS)?;
            if !insert_event_in(&mut events, event)? {
                return Ok(false);
            }
            let mut balances = txn.open_table(BALANCES)?;
            credit_in(
                &mut balances,
                &event.owner_id,
                event.currency,
                decimals,
                event.amount,
                event.created_at,
            )?;
            Ok(true)
        })
    }

    /// Debit the event's amount and append the event in one transaction.
    ///
    /// Returns the remaining balance, or `None` if the event id was already
    /// applied.
    pub fn debit_with_event(&self, event: &LedgerEvent) -> LedgerResult<Option<u64>> {
        self.db.write(|txn| {
            let mut events = txn.open_table(LEDGER_EVENTS)?;
            if !insert_event_in(&mut events, event)? {
                return Ok(None);
            }
            let mut balances = txn.open_table(BALANCES)?;
            let remaining = debit_in(
                &mut balances,
                &event.owner_id,
                event.currency,
                event.amount,
                event.created_at,
            )?;
            Ok(Some(remaining))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ledger_db::temp_ledger;

    fn credit(db: &LedgerDb, owner: &str, currency: Currency, amount: u64) -> u64 {
        db.write(|txn| {
            let mut table = txn.open_table(BALANCES)?;
            credit_in(&mut table, owner, currency, 6, amount, Utc::now())
        })
        .unwrap()
    }

    #[test]
    fn credit_creates_row_then_accumulates() {
        let (db, _dir) = temp_ledger();
        let repo = BalanceRepository::new(&db);
        assert_eq!(repo.amount("alice", Currency::Platform).unwrap(), 0);

        assert_eq!(credit(&db, "alice", Currency::Platform, 100), 100);
        assert_eq!(credit(&db, "alice", Currency::Platform, 50), 150);

        let row = repo.get("alice", Currency::Platform).unwrap().unwrap();
        assert_eq!(row.amount, 150);
        assert_eq!(row.chain, CHAIN_TAG);
        assert_eq!(row.decimals, 6);
    }

    #[test]
    fn debit_never_goes_negative() {
        let (db, _dir) = temp_ledger();
        credit(&db, "alice", Currency::Platform, 10);

        let err = db
            .write(|txn| {
                let mut table = txn.open_table(BALANCES)?;
                debit_in(&mut table, "alice", Currency::Platform, 11, Utc::now())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance { available: 10, requested: 11 }
        ));

        let missing = db
            .write(|txn| {
                let mut table = txn.open_table(BALANCES)?;
                debit_in(&mut table, "bob", Currency::Usdc, 1, Utc::now())
            })
            .unwrap_err();
        assert!(matches!(missing, LedgerError::InsufficientBalance { available: 0, .. }));
        assert_eq!(BalanceRepository::new(&db).amount("alice", Currency::Platform).unwrap(), 10);
    }

    fn withdrawal(id: &str, amount: u64) -> LedgerEvent {
        LedgerEvent {
            event_id: id.to_string(),
            owner_id: "alice".to_string(),
            kind: super::super::events::LedgerEventKind::Withdrawal,
            currency: Currency::Platform,
            amount,
            signature: Some(id.to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn debit_with_event_is_idempotent_on_signature() {
        let (db, _dir) = temp_ledger();
        credit(&db, "alice", Currency::Platform, 100);
        let repo = BalanceRepository::new(&db);

        assert_eq!(repo.debit_with_event(&withdrawal("sig-1", 40)).unwrap(), Some(60));
        assert_eq!(repo.debit_with_event(&withdrawal("sig-1", 40)).unwrap(), None);
        assert_eq!(repo.amount("alice", Currency::Platform).unwrap(), 60);
    }

    #[test]
    fn failed_debit_leaves_no_event() {
        let (db, _dir) = temp_ledger();
        credit(&db, "alice", Currency::Platform, 10);
        let repo = BalanceRepository::new(&db);

        assert!(repo.debit_with_event(&withdrawal("sig-2", 50)).is_err());
        let events = super::super::events::EventRepository::new(&db);
        assert!(events.get("sig-2").unwrap().is_none());
    }

    #[test]
    fn list_is_scoped_to_owner() {
        let (db, _dir) = temp_ledger();
        credit(&db, "alice", Currency::Platform, 1);
        credit(&db, "alice", Currency::Usdc, 2);
        credit(&db, "alice2", Currency::Usdc, 3);

        let rows = BalanceRepository::new(&db).list("alice").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.owner_id == "alice"));
    }
}
