// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodial account repository.
//!
//! ## Security
//!
//! - `encrypted_secret` is vault ciphertext; plaintext keys never reach storage
//! - The secret is never serialized into API responses and never logged
//! - Accounts are created lazily and never deleted

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::ledger_db::{
    decode, encode, LedgerDb, LedgerResult, ADDRESS_OWNERS, CUSTODIAL_ACCOUNTS,
};

/// Stored custodial account.
#[derive(Clone, Serialize, Deserialize)]
pub struct CustodialAccount {
    /// Platform user ID (unique)
    pub user_id: String,
    /// Base58 chain address
    pub chain_address: String,
    /// Vault ciphertext of the signing keypair
    pub encrypted_secret: String,
    /// When the account was generated
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for CustodialAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodialAccount")
            .field("user_id", &self.user_id)
            .field("chain_address", &self.chain_address)
            .field("encrypted_secret", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Public view of a custodial account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    /// Base58 chain address
    pub chain_address: String,
    /// When the account was generated
    pub created_at: DateTime<Utc>,
}

impl From<CustodialAccount> for AccountResponse {
    fn from(account: CustodialAccount) -> Self {
        Self {
            chain_address: account.chain_address,
            created_at: account.created_at,
        }
    }
}

/// Repository for custodial accounts.
pub struct AccountRepository<'a> {
    db: &'a LedgerDb,
}

impl<'a> AccountRepository<'a> {
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    /// Get the custodial account for a user, if one was generated.
    pub fn get(&self, user_id: &str) -> LedgerResult<Option<CustodialAccount>> {
        self.db.read(|txn| {
            let table = txn.open_table(CUSTODIAL_ACCOUNTS)?;
            table
                .get(user_id)?
                .map(|value| decode(value.value()))
                .transpose()
        })
    }

    /// Reverse lookup: which user owns a chain address.
    pub fn owner_of(&self, chain_address: &str) -> LedgerResult<Option<String>> {
        self.db.read(|txn| {
            let table = txn.open_table(ADDRESS_OWNERS)?;
            Ok(table.get(chain_address)?.map(|v| v.value().to_string()))
        })
    }

    /// Insert an account unless the user already has one.
    ///
    /// Returns the stored account and whether it was created by this call.
    /// When two requests race, the loser gets the winner's account back.
    pub fn insert_if_absent(
        &self,
        account: &CustodialAccount,
    ) -> LedgerResult<(CustodialAccount, bool)> {
        self.db.write(|txn| {
            let mut accounts = txn.open_table(CUSTODIAL_ACCOUNTS)?;
            let existing: Option<CustodialAccount> = accounts
                .get(account.user_id.as_str())?
                .map(|value| decode(value.value()))
                .transpose()?;
            if let Some(existing) = existing {
                return Ok((existing, false));
            }

            let bytes = encode(account)?;
            accounts.insert(account.user_id.as_str(), bytes.as_slice())?;

            let mut owners = txn.open_table(ADDRESS_OWNERS)?;
            owners.insert(account.chain_address.as_str(), account.user_id.as_str())?;

            Ok((account.clone(), true))
        })
    }
}
