// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Raw instruction encoders for the System, SPL Token and Associated Token
//! Account programs.

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use super::types::{
    associated_token_address, ASSOCIATED_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID,
};

/// System program `Transfer` discriminant (u32 LE).
const SYSTEM_TRANSFER: u32 = 2;

/// SPL Token `TransferChecked` tag.
const TOKEN_TRANSFER_CHECKED: u8 = 12;

/// SPL Token `BurnChecked` tag.
const TOKEN_BURN_CHECKED: u8 = 15;

/// Associated Token Account `CreateIdempotent` tag.
const ATA_CREATE_IDEMPOTENT: u8 = 1;

/// Native lamport transfer.
pub fn system_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    }
}

/// Token transfer between two token accounts, checked against the mint's decimals.
pub fn transfer_checked(
    source: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    owner: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Instruction {
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*source, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*owner, true),
        ],
        data: amount_data(TOKEN_TRANSFER_CHECKED, amount, decimals),
    }
}

/// Burn tokens from `account`, reducing the mint's supply.
pub fn burn_checked(
    account: &Pubkey,
    mint: &Pubkey,
    owner: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Instruction {
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*account, false),
            AccountMeta::new(*mint, false),
            AccountMeta::new_readonly(*owner, true),
        ],
        data: amount_data(TOKEN_BURN_CHECKED, amount, decimals),
    }
}

/// Create `wallet`'s associated token account for `mint`, funded by `payer`.
///
/// Uses `CreateIdempotent`, so an account created by someone else between
/// the existence check and submission does not fail the payment.
pub fn create_associated_token_account(
    payer: &Pubkey,
    wallet: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    let ata = associated_token_address(wallet, mint);
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*wallet, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ATA_CREATE_IDEMPOTENT],
    }
}

fn amount_data(tag: u8, amount: u64, decimals: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(10);
    data.push(tag);
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_transfer_layout() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let ix = system_transfer(&from, &to, 1_000);

        assert_eq!(ix.program_id, SYSTEM_PROGRAM_ID);
        assert_eq!(&ix.data[..4], &[2, 0, 0, 0]);
        assert_eq!(&ix.data[4..], &1_000u64.to_le_bytes());
        assert!(ix.accounts[0].is_signer && ix.accounts[0].is_writable);
        assert!(!ix.accounts[1].is_signer && ix.accounts[1].is_writable);
    }

    #[test]
    fn transfer_checked_layout() {
        let (src, mint, dst, owner) = (
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
        );
        let ix = transfer_checked(&src, &mint, &dst, &owner, 7, 6);

        assert_eq!(ix.program_id, TOKEN_PROGRAM_ID);
        assert_eq!(ix.data[0], 12);
        assert_eq!(&ix.data[1..9], &7u64.to_le_bytes());
        assert_eq!(ix.data[9], 6);
        assert_eq!(ix.accounts[2].pubkey, dst);
        assert!(ix.accounts[3].is_signer);
        assert!(!ix.accounts[1].is_writable);
    }

    #[test]
    fn burn_checked_layout() {
        let (account, mint, owner) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let ix = burn_checked(&account, &mint, &owner, 500, 9);

        assert_eq!(ix.data[0], 15);
        assert_eq!(ix.data.len(), 10);
        assert!(ix.accounts[1].is_writable);
        assert!(ix.accounts[2].is_signer);
    }

    #[test]
    fn create_ata_targets_derived_address() {
        let (payer, wallet, mint) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let ix = create_associated_token_account(&payer, &wallet, &mint);

        assert_eq!(ix.program_id, ASSOCIATED_TOKEN_PROGRAM_ID);
        assert_eq!(ix.data, [ATA_CREATE_IDEMPOTENT]);
        assert_eq!(ix.accounts[1].pubkey, associated_token_address(&wallet, &mint));
        assert!(ix.accounts[0].is_signer);
    }
}
