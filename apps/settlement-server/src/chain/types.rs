// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Solana program ids, currency specs and amount formatting.

use solana_sdk::pubkey::Pubkey;

use super::client::ChainError;
use crate::models::Currency;

/// System program.
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new_from_array([0u8; 32]);

/// SPL Token program (`TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`).
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133,
    237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// Associated Token Account program (`ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`).
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    140, 151, 37, 143, 78, 36, 137, 241, 187, 61, 16, 41, 20, 142, 13, 131, 11, 90, 19, 153, 218,
    255, 16, 132, 4, 142, 123, 216, 219, 233, 248, 89,
]);

/// Mainnet USDC mint (`EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v`).
pub const USDC_MAINNET_MINT: Pubkey = Pubkey::new_from_array([
    198, 250, 122, 243, 190, 219, 173, 58, 61, 101, 243, 106, 171, 201, 116, 49, 177, 187, 228,
    194, 210, 246, 224, 228, 124, 166, 2, 3, 69, 47, 93, 97,
]);

/// Lamports per SOL exponent.
pub const SOL_DECIMALS: u8 = 9;

/// USDC decimals.
pub const USDC_DECIMALS: u8 = 6;

/// Size of an SPL token account.
pub const TOKEN_ACCOUNT_LEN: usize = 165;

/// On-chain parameters of a settlement currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencySpec {
    pub currency: Currency,
    /// `None` for the native currency
    pub mint: Option<Pubkey>,
    pub decimals: u8,
}

impl CurrencySpec {
    pub fn is_native(&self) -> bool {
        self.mint.is_none()
    }
}

/// Resolves each supported currency to its on-chain parameters.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    usdc_mint: Pubkey,
    platform_mint: Pubkey,
    platform_decimals: u8,
}

impl TokenRegistry {
    pub fn new(usdc_mint: Pubkey, platform_mint: Pubkey, platform_decimals: u8) -> Self {
        Self {
            usdc_mint,
            platform_mint,
            platform_decimals,
        }
    }

    pub fn spec(&self, currency: Currency) -> CurrencySpec {
        match currency {
            Currency::Sol => CurrencySpec {
                currency,
                mint: None,
                decimals: SOL_DECIMALS,
            },
            Currency::Usdc => CurrencySpec {
                currency,
                mint: Some(self.usdc_mint),
                decimals: USDC_DECIMALS,
            },
            Currency::Platform => CurrencySpec {
                currency,
                mint: Some(self.platform_mint),
                decimals: self.platform_decimals,
            },
        }
    }
}

/// Derive the associated token account of `owner` for `mint`.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    let (address, _bump) = Pubkey::find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    );
    address
}

/// Parse a base58 address.
pub fn parse_address(raw: &str) -> Result<Pubkey, ChainError> {
    raw.trim()
        .parse()
        .map_err(|_| ChainError::InvalidAddress(raw.to_string()))
}

/// Read the `amount` field of a packed SPL token account.
pub fn token_account_amount(data: &[u8]) -> Result<u64, ChainError> {
    if data.len() < TOKEN_ACCOUNT_LEN {
        return Err(ChainError::InvalidAccountData(format!(
            "token account is {} bytes, expected {TOKEN_ACCOUNT_LEN}",
            data.len()
        )));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[64..72]);
    Ok(u64::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_ids_match_their_base58_form() {
        assert_eq!(
            TOKEN_PROGRAM_ID.to_string(),
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        );
        assert_eq!(
            ASSOCIATED_TOKEN_PROGRAM_ID.to_string(),
            "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"
        );
        assert_eq!(
            USDC_MAINNET_MINT.to_string(),
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"
        );
        assert_eq!(SYSTEM_PROGRAM_ID.to_string(), "11111111111111111111111111111111");
    }

    #[test]
    fn ata_derivation_is_deterministic_and_owner_specific() {
        let mint = Pubkey::new_unique();
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        assert_eq!(
            associated_token_address(&alice, &mint),
            associated_token_address(&alice, &mint)
        );
        assert_ne!(
            associated_token_address(&alice, &mint),
            associated_token_address(&bob, &mint)
        );
    }

    #[test]
    fn registry_resolves_specs() {
        let platform = Pubkey::new_unique();
        let registry = TokenRegistry::new(USDC_MAINNET_MINT, platform, 6);
        assert!(registry.spec(Currency::Sol).is_native());
        assert_eq!(registry.spec(Currency::Sol).decimals, 9);
        assert_eq!(registry.spec(Currency::Platform).mint, Some(platform));
        assert_eq!(registry.spec(Currency::Usdc).decimals, 6);
    }

    #[test]
    fn token_amount_reads_packed_layout() {
        let mut data = vec![0u8; TOKEN_ACCOUNT_LEN];
        data[64..72].copy_from_slice(&42u64.to_le_bytes());
        assert_eq!(token_account_amount(&data).unwrap(), 42);
        assert!(token_account_amount(&data[..10]).is_err());
    }

    #[test]
    fn parse_address_rejects_garbage() {
        assert!(parse_address("not-an-address").is_err());
        let key = Pubkey::new_unique();
        assert_eq!(parse_address(&key.to_string()).unwrap(), key);
    }
}
