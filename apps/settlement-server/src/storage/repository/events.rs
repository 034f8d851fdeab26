// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Append-only ledger events.
//!
//! Every off-chain balance movement that mirrors an on-chain or scheduled
//! action leaves one event. Event ids are deterministic (the transaction
//! signature, or `period:user` for rewards), which makes writes idempotent.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, Table};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Currency;
use crate::storage::ledger_db::{decode, encode, LedgerDb, LedgerResult, LEDGER_EVENTS};

/// What caused a balance movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    /// Off-chain balance moved on-chain to the user's account
    Withdrawal,
    /// Airdrop mirrored into the off-chain balance
    AirdropCredit,
    /// Periodic reward distribution
    RewardCredit,
}

impl LedgerEventKind {
    pub fn is_credit(&self) -> bool {
        !matches!(self, LedgerEventKind::Withdrawal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LedgerEvent {
    pub event_id: String,
    pub owner_id: String,
    pub kind: LedgerEventKind,
    pub currency: Currency,
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert an event inside an open write transaction.
///
/// Returns `false` without writing if an event with the same id exists.
pub(crate) fn insert_event_in(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    event: &LedgerEvent,
) -> LedgerResult<bool> {
    if table.get(event.event_id.as_str())?.is_some() {
        return Ok(false);
    }
    let bytes = encode(event)?;
    table.insert(event.event_id.as_str(), bytes.as_slice())?;
    Ok(true)
}

/// Read access to ledger events.
pub struct EventRepository<'a> {
    db: &'a LedgerDb,
}

impl<'a> EventRepository<'a> {
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    pub fn get(&self, event_id: &str) -> LedgerResult<Option<LedgerEvent>> {
        self.db.read(|txn| {
            let table = txn.open_table(LEDGER_EVENTS)?;
            table
                .get(event_id)?
                .map(|value| decode(value.value()))
                .transpose()
        })
    }

    /// Events of one owner, oldest first.
    pub fn list_for_owner(&self, owner_id: &str) -> LedgerResult<Vec<LedgerEvent>> {
        self.db.read(|txn| {
            let table = txn.open_table(LEDGER_EVENTS)?;
            let mut events = Vec::new();
            for entry in table.iter()? {
                let (_, value) = entry?;
                let event: LedgerEvent = decode(value.value())?;
                if event.owner_id == owner_id {
                    events.push(event);
                }
            }
            events.sort_by_key(|event| event.created_at);
            Ok(events)
        })
    }
}
