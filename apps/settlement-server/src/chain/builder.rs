// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment transaction builder.
//!
//! Splits one payment across several beneficiaries and emits the matching
//! instructions. The builder never signs and never submits; it only reads
//! the chain to find missing token accounts and a fresh blockhash.
//!
//! ## Residual Policy
//!
//! Every leg except the last gets `floor(amount * ratio / total)`. The last
//! leg gets whatever is left, so the legs always sum to `amount` exactly.

use std::collections::HashMap;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::Transaction;

use super::client::{ChainClient, ChainError};
use super::instructions::{
    burn_checked, create_associated_token_account, system_transfer, transfer_checked,
};
use super::types::{associated_token_address, CurrencySpec};
use crate::models::Currency;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("payment amount must be greater than zero")]
    ZeroAmount,

    #[error("at least one beneficiary is required")]
    NoBeneficiaries,

    #[error("beneficiary ratios must sum to a positive value")]
    ZeroRatioTotal,

    #[error("{0} cannot be burned")]
    BurnUnsupported(Currency),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Where a leg's funds go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Wallet address; for tokens the associated token account is derived
    Account(Pubkey),
    /// Destroy the funds (burnable tokens only)
    Burn,
}

/// A recipient and its share weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beneficiary {
    pub destination: Destination,
    pub ratio: u64,
}

impl Beneficiary {
    pub fn account(address: Pubkey, ratio: u64) -> Self {
        Self {
            destination: Destination::Account(address),
            ratio,
        }
    }

    pub fn burn(ratio: u64) -> Self {
        Self {
            destination: Destination::Burn,
            ratio,
        }
    }
}

/// Amount actually routed to one beneficiary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentLeg {
    pub destination: Destination,
    pub amount: u64,
}

/// Built but unsigned payment.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub transaction: Transaction,
    pub legs: Vec<PaymentLeg>,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

impl UnsignedTransaction {
    /// Serialized message for an external signer.
    pub fn message_base64(&self) -> String {
        Base64::encode_string(&self.transaction.message.serialize())
    }

    /// Sign with the fee payer's key. Returns the transaction signature.
    pub fn sign(&mut self, signer: &Keypair) -> Result<Signature, ChainError> {
        self.transaction
            .try_sign(&[signer], self.blockhash)
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        self.transaction
            .signatures
            .first()
            .copied()
            .ok_or_else(|| ChainError::Signing("transaction has no signature slot".to_string()))
    }
}

/// Split `amount` by `ratios`, giving the rounding residual to the last entry.
pub fn split_amount(amount: u64, ratios: &[u64]) -> Result<Vec<u64>, BuildError> {
    if amount == 0 {
        return Err(BuildError::ZeroAmount);
    }
    let Some((_, head)) = ratios.split_last() else {
        return Err(BuildError::NoBeneficiaries);
    };

    let total: u128 = ratios.iter().map(|&r| r as u128).sum();
    if total == 0 {
        return Err(BuildError::ZeroRatioTotal);
    }

    let mut legs: Vec<u64> = head
        .iter()
        .map(|&ratio| (amount as u128 * ratio as u128 / total) as u64)
        .collect();
    // Each floor is at most its exact share, so the head never exceeds amount
    let allocated: u64 = legs.iter().sum();
    legs.push(amount - allocated);
    Ok(legs)
}

/// Builds split-payment transactions against a live chain view.
pub struct PaymentTransactionBuilder {
    client: Arc<dyn ChainClient>,
}

impl PaymentTransactionBuilder {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }

    /// Build a transaction paying `amount` from `payer` to `beneficiaries`.
    pub async fn build(
        &self,
        payer: &Pubkey,
        beneficiaries: &[Beneficiary],
        amount: u64,
        currency: &CurrencySpec,
    ) -> Result<UnsignedTransaction, BuildError> {
        let burns = beneficiaries
            .iter()
            .any(|b| b.destination == Destination::Burn);
        if burns && !currency.currency.is_burnable() {
            return Err(BuildError::BurnUnsupported(currency.currency));
        }

        let ratios: Vec<u64> = beneficiaries.iter().map(|b| b.ratio).collect();
        let legs: Vec<PaymentLeg> = split_amount(amount, &ratios)?
            .into_iter()
            .zip(beneficiaries)
            .map(|(amount, b)| PaymentLeg {
                destination: b.destination,
                amount,
            })
            .collect();

        let mut instructions = Vec::new();
        match currency.mint {
            None => {
                for leg in legs.iter().filter(|leg| leg.amount > 0) {
                    if let Destination::Account(to) = leg.destination {
                        instructions.push(system_transfer(payer, &to, leg.amount));
                    }
                }
            }
            Some(mint) => {
                let source = associated_token_address(payer, &mint);
                // ATA -> known to exist (on-chain or created earlier in this tx)
                let mut known: HashMap<Pubkey, bool> = HashMap::new();

                for leg in legs.iter().filter(|leg| leg.amount > 0) {
                    match leg.destination {
                        Destination::Account(owner) => {
                            let ata = associated_token_address(&owner, &mint);
                            let exists = match known.get(&ata) {
                                Some(&exists) => exists,
                                None => self.client.account_exists(&ata).await?,
                            };
                            if !exists {
                                instructions
                                    .push(create_associated_token_account(payer, &owner, &mint));
                            }
                            known.insert(ata, true);
                            instructions.push(transfer_checked(
                                &source,
                                &mint,
                                &ata,
                                payer,
                                leg.amount,
                                currency.decimals,
                            ));
                        }
                        Destination::Burn => {
                            instructions.push(burn_checked(
                                &source,
                                &mint,
                                payer,
                                leg.amount,
                                currency.decimals,
                            ));
                        }
                    }
                }
            }
        }

        let (blockhash, last_valid_block_height) = self.client.latest_blockhash().await?;
        let message = Message::new_with_blockhash(&instructions, Some(payer), &blockhash);

        Ok(UnsignedTransaction {
            transaction: Transaction::new_unsigned(message),
            legs,
            blockhash,
            last_valid_block_height,
        })
    }
}
