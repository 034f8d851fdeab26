// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodial keypair generation and signer loading.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

use super::{KeyVault, VaultError};
use crate::storage::CustodialAccount;

/// A freshly generated custodial keypair, already sealed by the vault.
#[derive(Debug, Clone)]
pub struct GeneratedAccount {
    /// Public chain address (base58).
    pub chain_address: String,
    /// Vault ciphertext of the 64-byte keypair.
    pub encrypted_secret: String,
}

/// Generate an ed25519 keypair and seal its secret half immediately.
///
/// The plaintext keypair is dropped before this function returns; only the
/// ciphertext is handed to the caller for persistence.
pub fn generate_custodial_keypair(vault: &KeyVault) -> Result<GeneratedAccount, VaultError> {
    let keypair = Keypair::new();
    let encrypted_secret = vault.encrypt(&keypair.to_bytes())?;

    Ok(GeneratedAccount {
        chain_address: keypair.pubkey().to_string(),
        encrypted_secret,
    })
}

/// Decrypt a custodial account's keypair for the duration of one settlement.
///
/// Fails with `KeyMismatch` if the decrypted key does not belong to the
/// account's registered address.
pub fn load_signer(vault: &KeyVault, account: &CustodialAccount) -> Result<Keypair, VaultError> {
    let secret = vault.decrypt(&account.encrypted_secret)?;
    let keypair = Keypair::try_from(secret.as_slice())
        .map_err(|_| VaultError::Decryption("invalid keypair bytes"))?;

    let expected: Pubkey = account
        .chain_address
        .parse()
        .map_err(|_| VaultError::KeyMismatch)?;
    if keypair.pubkey() != expected {
        return Err(VaultError::KeyMismatch);
    }

    Ok(keypair)
}
