// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payments and unlock records.
//!
//! ## Storage Layout
//!
//! ```text
//! payments: signature                          → PaymentRecord
//! unlocks:  user|content|chapter_ref|signature → UnlockRecord
//! ```
//!
//! A payment and the unlock it grants are always written in the same
//! transaction, keyed on the confirmed signature.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Currency, PaymentType, WHOLE_CONTENT};
use crate::storage::ledger_db::{
    composite_key, decode, encode, key_prefix, LedgerDb, LedgerResult, PAYMENTS, UNLOCKS,
};

/// Confirmed content payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentRecord {
    /// Transaction signature (unique)
    pub signature: String,
    pub payer_address: String,
    pub user_id: String,
    pub content_id: String,
    /// Chapter id, or `*` for whole-content purchases
    pub chapter_ref: String,
    /// Minor units
    pub amount: u64,
    pub currency: Currency,
    pub decimals: u8,
    pub payment_type: PaymentType,
    pub created_at: DateTime<Utc>,
}

/// Access grant produced by a confirmed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UnlockRecord {
    pub user_id: String,
    pub content_id: String,
    pub chapter_ref: String,
    pub payment_type: PaymentType,
    pub signature: String,
    pub unlocked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl UnlockRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires| expires > now)
    }

    fn key(&self) -> String {
        composite_key(&[
            &self.user_id,
            &self.content_id,
            &self.chapter_ref,
            &self.signature,
        ])
    }
}

/// Result of recording a confirmed payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// The signature was already recorded; nothing was written
    AlreadyRecorded,
}

/// Repository for payments and unlocks.
pub struct UnlockRepository<'a> {
    db: &'a LedgerDb,
}

impl<'a> UnlockRepository<'a> {
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    /// Find a non-expired unlock covering `chapter_ref` of `content_id`.
    ///
    /// A chapter is covered by its own unlock or by a whole-content grant;
    /// `*` is covered only by a whole-content grant.
    pub fn active_unlock(
        &self,
        user_id: &str,
        content_id: &str,
        chapter_ref: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<Option<UnlockRecord>> {
        let mut prefixes = vec![key_prefix(&[user_id, content_id, WHOLE_CONTENT])];
        if chapter_ref != WHOLE_CONTENT {
            prefixes.push(key_prefix(&[user_id, content_id, chapter_ref]));
        }

        self.db.read(|txn| {
            let table = txn.open_table(UNLOCKS)?;
            for prefix in &prefixes {
                for entry in table.range(prefix.as_str()..)? {
                    let (key, value) = entry?;
                    if !key.value().starts_with(prefix.as_str()) {
                        break;
                    }
                    let record: UnlockRecord = decode(value.value())?;
                    if record.is_active(now) {
                        return Ok(Some(record));
                    }
                }
            }
            Ok(None)
        })
    }

    pub fn get_payment(&self, signature: &str) -> LedgerResult<Option<PaymentRecord>> {
        self.db.read(|txn| {
            let table = txn.open_table(PAYMENTS)?;
            table
                .get(signature)?
                .map(|value| decode(value.value()))
                .transpose()
        })
    }

    /// Write a payment and its unlock atomically.
    ///
    /// Idempotent on the payment signature.
    pub fn record(
        &self,
        payment: &PaymentRecord,
        unlock: &UnlockRecord,
    ) -> LedgerResult<RecordOutcome> {
        self.db.write(|txn| {
            let mut payments = txn.open_table(PAYMENTS)?;
            if payments.get(payment.signature.as_str())?.is_some() {
                return Ok(RecordOutcome::AlreadyRecorded);
            }
            let payment_bytes = encode(payment)?;
            payments.insert(payment.signature.as_str(), payment_bytes.as_slice())?;

            let mut unlocks = txn.open_table(UNLOCKS)?;
            let unlock_bytes = encode(unlock)?;
            unlocks.insert(unlock.key().as_str(), unlock_bytes.as_slice())?;

            Ok(RecordOutcome::Recorded)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ledger_db::temp_ledger;
    use chrono::Duration;

    fn payment(signature: &str, chapter_ref: &str, payment_type: PaymentType) -> PaymentRecord {
        PaymentRecord {
            signature: signature.to_string(),
            payer_address: "Payer".to_string(),
            user_id: "alice".to_string(),
            content_id: "novel-1".to_string(),
            chapter_ref: chapter_ref.to_string(),
            amount: 1_000,
            currency: Currency::Usdc,
            decimals: 6,
            payment_type,
            created_at: Utc::now(),
        }
    }

    fn unlock_for(payment: &PaymentRecord, expires_at: Option<DateTime<Utc>>) -> UnlockRecord {
        UnlockRecord {
            user_id: payment.user_id.clone(),
            content_id: payment.content_id.clone(),
            chapter_ref: payment.chapter_ref.clone(),
            payment_type: payment.payment_type,
            signature: payment.signature.clone(),
            unlocked_at: payment.created_at,
            expires_at,
        }
    }

    #[test]
    fn single_unlock_covers_only_its_chapter() {
        let (db, _dir) = temp_ledger();
        let repo = UnlockRepository::new(&db);
        let now = Utc::now();
        let p = payment("sig-1", "ch-1", PaymentType::Single);
        assert_eq!(repo.record(&p, &unlock_for(&p, None)).unwrap(), RecordOutcome::Recorded);

        assert!(repo.active_unlock("alice", "novel-1", "ch-1", now).unwrap().is_some());
        assert!(repo.active_unlock("alice", "novel-1", "ch-10", now).unwrap().is_none());
        assert!(repo.active_unlock("bob", "novel-1", "ch-1", now).unwrap().is_none());
        assert_eq!(repo.get_payment("sig-1").unwrap().unwrap(), p);
    }

    #[test]
    fn bundle_unlock_covers_every_chapter_until_expiry() {
        let (db, _dir) = temp_ledger();
        let repo = UnlockRepository::new(&db);
        let now = Utc::now();
        let p = payment("sig-2", WHOLE_CONTENT, PaymentType::Bundle);
        repo.record(&p, &unlock_for(&p, Some(now + Duration::days(30))))
            .unwrap();

        assert!(repo.active_unlock("alice", "novel-1", "ch-7", now).unwrap().is_some());
        let later = now + Duration::days(31);
        assert!(repo.active_unlock("alice", "novel-1", "ch-7", later).unwrap().is_none());
    }

    #[test]
    fn single_unlock_does_not_cover_whole_content() {
        let (db, _dir) = temp_ledger();
        let repo = UnlockRepository::new(&db);
        let now = Utc::now();
        let p = payment("sig-4", "ch-1", PaymentType::Single);
        repo.record(&p, &unlock_for(&p, None)).unwrap();

        assert!(repo.active_unlock("alice", "novel-1", WHOLE_CONTENT, now).unwrap().is_none());
    }

    #[test]
    fn recording_same_signature_twice_is_noop() {
        let (db, _dir) = temp_ledger();
        let repo = UnlockRepository::new(&db);
        let p = payment("sig-3", "ch-1", PaymentType::Single);
        repo.record(&p, &unlock_for(&p, None)).unwrap();

        let mut changed = p.clone();
        changed.amount = 5;
        assert_eq!(
            repo.record(&changed, &unlock_for(&changed, None)).unwrap(),
            RecordOutcome::AlreadyRecorded
        );
        assert_eq!(repo.get_payment("sig-3").unwrap().unwrap().amount, 1_000);
    }
}
