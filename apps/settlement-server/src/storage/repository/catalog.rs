// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Minimal content catalog: who gets paid and which chapters are locked.

use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::LockPolicy;
use crate::storage::ledger_db::{
    composite_key, decode, encode, LedgerDb, LedgerResult, CHAPTERS, CONTENTS,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Content {
    pub content_id: String,
    pub title: String,
    /// Author's payout address (base58)
    pub author_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Chapter {
    pub content_id: String,
    pub chapter_id: String,
    pub lock_policy: LockPolicy,
}

pub struct CatalogRepository<'a> {
    db: &'a LedgerDb,
}

impl<'a> CatalogRepository<'a> {
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    pub fn get_content(&self, content_id: &str) -> LedgerResult<Option<Content>> {
        self.db.read(|txn| {
            let table = txn.open_table(CONTENTS)?;
            table
                .get(content_id)?
                .map(|value| decode(value.value()))
                .transpose()
        })
    }

    pub fn get_chapter(&self, content_id: &str, chapter_id: &str) -> LedgerResult<Option<Chapter>> {
        let key = composite_key(&[content_id, chapter_id]);
        self.db.read(|txn| {
            let table = txn.open_table(CHAPTERS)?;
            table
                .get(key.as_str())?
                .map(|value| decode(value.value()))
                .transpose()
        })
    }

    pub fn upsert_content(&self, content: &Content) -> LedgerResult<()> {
        self.db.write(|txn| {
            let mut table = txn.open_table(CONTENTS)?;
            let bytes = encode(content)?;
            table.insert(content.content_id.as_str(), bytes.as_slice())?;
            Ok(())
        })
    }

    pub fn upsert_chapter(&self, chapter: &Chapter) -> LedgerResult<()> {
        let key = composite_key(&[&chapter.content_id, &chapter.chapter_id]);
        self.db.write(|txn| {
            let mut table = txn.open_table(CHAPTERS)?;
            let bytes = encode(chapter)?;
            table.insert(key.as_str(), bytes.as_slice())?;
            Ok(())
        })
    }
}
